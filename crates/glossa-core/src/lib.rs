//! Core of the Glossa language-learning chat client.
//!
//! The crate is organized around two building blocks:
//!
//! - [`service`]: a small generic reactive container decoupling a service's
//!   Options/State from its observers,
//! - [`coach`]: the conversation domain built on top of it, with an in-memory
//!   conversation store, the conversation lifecycle, and a streaming session
//!   manager reconstructing incrementally-delivered teacher replies.
//!
//! External collaborators (the coach HTTP API, speech devices) are consumed
//! through narrow traits; `glossa-client` and `glossa-speech` provide the
//! concrete implementations.

pub mod coach;
pub mod error;
pub mod language;
pub mod service;

// Re-export common error type
pub use error::{GlossaError, Result};
