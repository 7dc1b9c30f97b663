//! Conversation coaching: domain model, collaborator contract, and the
//! reactive service driving conversations and streamed teacher replies.

pub mod api;
pub mod model;
pub mod service;

pub use api::{LanguageCoachApi, ReplyDelta, ReplyStream, StreamEvent};
pub use model::{ChatMessage, CoachOptions, CoachState, Conversation};
pub use service::{CoachService, DEFAULT_STREAM_IDLE_TIMEOUT};
