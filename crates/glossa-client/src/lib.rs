//! HTTP/SSE collaborator implementation for the Glossa core.
//!
//! Provides [`HttpLanguageCoachApi`], an implementation of the
//! `LanguageCoachApi` contract over the coach API's JSON endpoints and its
//! `text/event-stream` reply stream, plus client configuration and the
//! startup-time [`Platform`] capability strategy.

pub mod config;
pub mod http;
pub mod platform;
mod sse;

pub use config::ClientConfig;
pub use http::HttpLanguageCoachApi;
pub use platform::{Platform, PlatformKind};
