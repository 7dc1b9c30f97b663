//! Collaborator contract for the coach service.
//!
//! Defines the abstract interface the core depends on for conversation and
//! message persistence plus the push stream delivering teacher replies. No
//! transport syntax is mandated here; `glossa-client` provides the HTTP/SSE
//! implementation.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};

use crate::error::Result;
use crate::language::Language;

use super::model::{ChatMessage, Conversation};

/// One increment of a streamed teacher reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplyDelta {
    /// Text to append to the in-progress teacher message.
    pub delta: String,
    /// True on the terminal event of a reply.
    pub is_finished: bool,
    /// Phrases worth studying, overwritten from the latest event.
    #[serde(default)]
    pub learning_phrases: Option<Vec<String>>,
}

/// Events delivered over a reply stream.
///
/// The stream ends when the underlying channel closes; a well-formed reply
/// ends with a `Delta` whose `is_finished` is true, anything else is a
/// transport failure.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Delta(ReplyDelta),
    Error(String),
}

/// Receiving half of an open reply stream.
///
/// Closing is idempotent and signals the producer to stop promptly; dropping
/// the stream closes it as well.
pub struct ReplyStream {
    events: mpsc::UnboundedReceiver<StreamEvent>,
    cancel: Option<oneshot::Sender<()>>,
}

impl ReplyStream {
    /// Creates a connected (sender, cancel signal, stream) triple.
    ///
    /// Implementations forward events through the sender from a worker task
    /// and stop when the cancel signal fires or the sender is dropped.
    pub fn open() -> (
        mpsc::UnboundedSender<StreamEvent>,
        oneshot::Receiver<()>,
        ReplyStream,
    ) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        (
            event_tx,
            cancel_rx,
            ReplyStream {
                events: event_rx,
                cancel: Some(cancel_tx),
            },
        )
    }

    /// Waits for the next event; `None` once the producer is done or gone.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Signals the producer to stop. Safe to call any number of times.
    pub fn close(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

impl Drop for ReplyStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// The external language-coach API the core consumes.
///
/// All operations fail with a transport-level [`crate::GlossaError`]; the
/// coach service converts those failures into observable state rather than
/// letting them escape.
#[async_trait]
pub trait LanguageCoachApi: Send + Sync {
    /// Lists every stored conversation.
    async fn list_conversations(&self) -> Result<Vec<Conversation>>;

    /// Creates a conversation for the given language pair.
    async fn create_conversation(
        &self,
        primary: &Language,
        learning: &Language,
    ) -> Result<Conversation>;

    /// Deletes a conversation. `Ok(false)` means the server refused.
    async fn delete_conversation(&self, conversation_id: &str) -> Result<bool>;

    /// Loads the message log of a conversation, already paired
    /// (user + teacher) and position-ordered.
    async fn load_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>>;

    /// Deletes every message at or past `from_position`.
    /// `Ok(false)` means the server refused.
    async fn delete_messages(&self, conversation_id: &str, from_position: u32) -> Result<bool>;

    /// Opens a push stream that will deliver the teacher's reply to
    /// `user_text` as a sequence of deltas.
    async fn open_reply_stream(
        &self,
        conversation_id: &str,
        user_text: &str,
    ) -> Result<ReplyStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stream_delivers_events_in_order() {
        let (events, _cancel, mut stream) = ReplyStream::open();

        events
            .send(StreamEvent::Delta(ReplyDelta {
                delta: "Hel".to_string(),
                is_finished: false,
                learning_phrases: None,
            }))
            .unwrap();
        events
            .send(StreamEvent::Error("boom".to_string()))
            .unwrap();
        drop(events);

        assert!(matches!(
            stream.next().await,
            Some(StreamEvent::Delta(ReplyDelta { ref delta, .. })) if delta == "Hel"
        ));
        assert!(matches!(stream.next().await, Some(StreamEvent::Error(_))));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_signals_cancel() {
        let (_events, mut cancel, mut stream) = ReplyStream::open();

        stream.close();
        stream.close();

        assert!(cancel.try_recv().is_ok());
    }

    #[tokio::test]
    async fn drop_signals_cancel() {
        let (_events, mut cancel, stream) = ReplyStream::open();
        drop(stream);
        assert!(cancel.try_recv().is_ok());
    }

    #[test]
    fn reply_delta_parses_wire_payload() {
        let parsed: ReplyDelta = serde_json::from_str(
            r#"{"conversation_id":"c1","content_id":"m1","delta":"Hola","is_finished":true,"learning_phrases":["Hola"]}"#,
        )
        .unwrap();

        assert_eq!(parsed.delta, "Hola");
        assert!(parsed.is_finished);
        assert_eq!(parsed.learning_phrases.unwrap(), vec!["Hola".to_string()]);
    }

    #[test]
    fn reply_delta_tolerates_missing_phrases() {
        let parsed: ReplyDelta =
            serde_json::from_str(r#"{"delta":"...","is_finished":false}"#).unwrap();
        assert!(parsed.learning_phrases.is_none());
    }
}
