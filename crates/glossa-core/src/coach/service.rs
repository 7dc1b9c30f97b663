//! The coach service: conversation lifecycle and streaming reply sessions.
//!
//! `CoachService` owns the reactive Options/State pair for the chat surface
//! and orchestrates the collaborator API: creating/selecting/deleting
//! conversations, loading and truncating the message log, and driving one
//! "send user turn, stream teacher turn" cycle at a time.
//!
//! Collaborator failures never escape this boundary: they are converted into
//! `error_reason` state and the triggering operation reports failure through
//! its return value.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::language::Language;
use crate::service::{Observer, Service};

use super::api::{LanguageCoachApi, ReplyStream, StreamEvent};
use super::model::{ChatMessage, CoachOptions, CoachState, Conversation};

/// Default bound on the silence between two stream events before the cycle
/// is failed.
pub const DEFAULT_STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

struct StreamHandle {
    task: JoinHandle<()>,
}

/// Reactive language-coach service.
///
/// One instance owns one conversation list and one message log; state is
/// observed through [`CoachService::subscribe`]. Exactly one reply stream
/// may be open per instance.
pub struct CoachService {
    service: Service<CoachOptions, CoachState>,
    api: Arc<dyn LanguageCoachApi>,
    stream_idle_timeout: Duration,
    /// The in-flight reply stream's drive task, if any.
    active_stream: Mutex<Option<StreamHandle>>,
    /// Monotonically increasing token; a message load is applied only when
    /// no newer selection happened while it was in flight.
    load_generation: AtomicU64,
}

impl CoachService {
    /// Creates a coach service on top of the given collaborator API.
    pub fn new(api: Arc<dyn LanguageCoachApi>) -> Self {
        Self {
            service: Service::new(CoachOptions::default(), CoachState::default()),
            api,
            stream_idle_timeout: DEFAULT_STREAM_IDLE_TIMEOUT,
            active_stream: Mutex::new(None),
            load_generation: AtomicU64::new(0),
        }
    }

    /// Overrides the stream idle timeout after construction.
    pub fn with_stream_idle_timeout(mut self, stream_idle_timeout: Duration) -> Self {
        self.stream_idle_timeout = stream_idle_timeout;
        self
    }

    // ------------------------------------------------------------------
    // Reactive surface
    // ------------------------------------------------------------------

    /// Returns a snapshot of the current Options.
    pub fn options(&self) -> CoachOptions {
        self.service.options()
    }

    /// Returns a snapshot of the current State.
    pub fn state(&self) -> CoachState {
        self.service.state()
    }

    /// Replaces the Options (e.g. the pending input text) and notifies
    /// observers. State is mutated only by the service itself.
    pub fn update_options<F>(&self, f: F) -> CoachOptions
    where
        F: FnOnce(CoachOptions) -> CoachOptions,
    {
        self.service.update_options(f)
    }

    /// Subscribes an observer; it immediately receives the current
    /// Options and State.
    pub fn subscribe(&self, observer: Arc<dyn Observer<CoachOptions, CoachState>>) {
        self.service.subscribe(observer);
    }

    /// Removes an observer; no-op if it was never subscribed.
    pub fn unsubscribe(&self, observer: &Arc<dyn Observer<CoachOptions, CoachState>>) {
        self.service.unsubscribe(observer);
    }

    // ------------------------------------------------------------------
    // Conversation lifecycle
    // ------------------------------------------------------------------

    /// Creates a conversation for the given language pair and makes it the
    /// active one, clearing the message log.
    ///
    /// Returns `None` on failure, with the reason surfaced in state.
    pub async fn create_conversation(
        &self,
        primary: &Language,
        learning: &Language,
    ) -> Option<Conversation> {
        match self.api.create_conversation(primary, learning).await {
            Ok(conversation) => {
                tracing::info!(conversation_id = %conversation.id, "conversation created");
                self.load_generation.fetch_add(1, Ordering::SeqCst);
                self.service.update_state(|s| {
                    s.with_conversation(Some(conversation.clone()))
                        .with_messages(Vec::new())
                });
                Some(conversation)
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to create conversation");
                self.service.update_state(|s| {
                    s.with_error_reason(Some(format!("failed to create conversation: {err}")))
                });
                None
            }
        }
    }

    /// Replaces the conversation list with the server's.
    ///
    /// A transport failure is logged and yields an empty result without
    /// clobbering a previously loaded list.
    pub async fn load_conversations(&self) -> Vec<Conversation> {
        match self.api.list_conversations().await {
            Ok(conversations) => {
                self.service
                    .update_state(|s| s.with_conversations(conversations.clone()));
                conversations
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to load conversations");
                Vec::new()
            }
        }
    }

    /// Selects the active conversation.
    ///
    /// - `None` or an unknown id clears the active conversation and the log.
    /// - The already-active id is a no-op (no clear, no reload).
    /// - A different known id becomes active immediately with a cleared log,
    ///   and the log is filled asynchronously once loaded. A load that was
    ///   overtaken by a newer selection is discarded.
    pub fn select_conversation(self: &Arc<Self>, conversation_id: Option<&str>) {
        let target = conversation_id
            .and_then(|id| self.service.state().find_conversation(id).cloned());

        let Some(conversation) = target else {
            self.load_generation.fetch_add(1, Ordering::SeqCst);
            self.service
                .update_state(|s| s.with_conversation(None).with_messages(Vec::new()));
            return;
        };

        let active_id = self.service.state().conversation.map(|c| c.id);
        if active_id.as_deref() == Some(conversation.id.as_str()) {
            return;
        }

        // clear immediately so observers render "loading" instead of the
        // previous conversation's log
        self.service.update_state(|s| {
            s.with_conversation(Some(conversation.clone()))
                .with_messages(Vec::new())
        });

        let generation = self.load_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let messages = match this.api.load_messages(&conversation.id).await {
                Ok(messages) => messages,
                Err(err) => {
                    tracing::error!(
                        conversation_id = %conversation.id,
                        error = %err,
                        "failed to load messages"
                    );
                    return;
                }
            };
            if this.load_generation.load(Ordering::SeqCst) == generation {
                this.service.update_state(|s| s.with_messages(messages));
            } else {
                tracing::debug!(
                    conversation_id = %conversation.id,
                    "discarding message load overtaken by a newer selection"
                );
            }
        });
    }

    /// Deletes a conversation.
    ///
    /// The active conversation is cleared optimistically; if the collaborator
    /// call fails or the server refuses, the prior active conversation and
    /// its log are restored and the reason is surfaced in state. On success
    /// the conversation list is re-fetched.
    pub async fn delete_conversation(&self, conversation_id: &str) -> bool {
        let state = self.service.state();
        if state.find_conversation(conversation_id).is_none() {
            tracing::warn!(%conversation_id, "cannot delete unknown conversation");
            return false;
        }

        let was_active = state
            .conversation
            .as_ref()
            .is_some_and(|c| c.id == conversation_id);
        let prior_conversation = state.conversation.clone();
        let prior_messages = state.messages.clone();

        if was_active {
            self.load_generation.fetch_add(1, Ordering::SeqCst);
            self.service
                .update_state(|s| s.with_conversation(None).with_messages(Vec::new()));
        }

        let failure = match self.api.delete_conversation(conversation_id).await {
            Ok(true) => None,
            Ok(false) => Some(format!("server refused to delete conversation {conversation_id}")),
            Err(err) => Some(format!("failed to delete conversation: {err}")),
        };

        match failure {
            None => {
                tracing::info!(%conversation_id, "conversation deleted");
                self.load_conversations().await;
                true
            }
            Some(reason) => {
                tracing::error!(%conversation_id, %reason, "conversation deletion failed");
                self.service.update_state(|s| {
                    let s = if was_active {
                        s.with_conversation(prior_conversation)
                            .with_messages(prior_messages)
                    } else {
                        s
                    };
                    s.with_error_reason(Some(reason))
                });
                false
            }
        }
    }

    /// Deletes every message at or past `position`.
    ///
    /// The local log is truncated only after the collaborator confirms; on
    /// failure it is left untouched.
    pub async fn delete_messages_from(&self, conversation_id: &str, position: u32) -> bool {
        if self
            .service
            .state()
            .find_conversation(conversation_id)
            .is_none()
        {
            tracing::warn!(%conversation_id, "cannot delete messages of unknown conversation");
            return false;
        }

        match self.api.delete_messages(conversation_id, position).await {
            Ok(true) => {
                self.service.update_state(|s| s.truncate_from(position));
                true
            }
            Ok(false) => {
                tracing::error!(%conversation_id, position, "server refused to delete messages");
                false
            }
            Err(err) => {
                tracing::error!(%conversation_id, position, error = %err, "failed to delete messages");
                self.service.update_state(|s| {
                    s.with_error_reason(Some(format!("failed to delete messages: {err}")))
                });
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Streaming session
    // ------------------------------------------------------------------

    /// Sends the pending input text and streams the teacher's reply into the
    /// message log.
    ///
    /// Preconditions (checked before any mutation): non-empty input text and
    /// an active conversation. Returns `true` once the stream is open and
    /// being driven; the cycle completes in the background and always ends
    /// with `is_thinking == false`.
    pub async fn send(self: &Arc<Self>) -> bool {
        let input = self
            .service
            .options()
            .input_text
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        let Some(input) = input else {
            tracing::warn!("no input text to send");
            return false;
        };
        let Some(conversation) = self.service.state().conversation else {
            tracing::warn!("no active conversation to send to");
            return false;
        };

        // only one stream per instance: tear down any previous cycle first
        self.teardown_stream();

        self.service.update_state(|s| s.with_thinking(true));
        self.service.update_options(|o| o.with_input_text(None));

        // reserve the log slot the streamed reply will be written into
        let mut position = 0;
        self.service.update_state(|s| {
            position = s.next_position();
            let placeholder = ChatMessage::pending(conversation.id.clone(), position, input.clone());
            let mut messages = s.messages.clone();
            messages.push(placeholder);
            s.with_messages(messages)
        });

        let stream = match self.api.open_reply_stream(&conversation.id, &input).await {
            Ok(stream) => stream,
            Err(err) => {
                tracing::error!(
                    conversation_id = %conversation.id,
                    error = %err,
                    "failed to open reply stream"
                );
                self.finish_cycle(Some(format!("failed to open reply stream: {err}")));
                return false;
            }
        };

        tracing::debug!(conversation_id = %conversation.id, position, "reply stream open");
        let this = Arc::clone(self);
        let task = tokio::spawn(this.drive_stream(stream, position));
        *self.active_stream.lock().expect("stream slot poisoned") = Some(StreamHandle { task });
        true
    }

    /// Closes the in-flight reply stream, if any.
    ///
    /// Safe to call any number of times; always leaves
    /// `is_thinking == false`.
    pub fn cancel_send(&self) {
        self.teardown_stream();
        self.finish_cycle(None);
    }

    /// Applies stream events to the reserved log slot until the reply
    /// finishes or the cycle fails.
    async fn drive_stream(self: Arc<Self>, mut stream: ReplyStream, position: u32) {
        loop {
            let polled = timeout(self.stream_idle_timeout, stream.next()).await;
            let event = match polled {
                Err(_) => {
                    stream.close();
                    self.release_stream_slot();
                    self.finish_cycle(Some(format!(
                        "reply stream timed out after {:?} of silence",
                        self.stream_idle_timeout
                    )));
                    return;
                }
                Ok(event) => event,
            };

            match event {
                None => {
                    // the producer went away without a finishing delta
                    self.release_stream_slot();
                    self.finish_cycle(Some(
                        "reply stream closed before the reply finished".to_string(),
                    ));
                    return;
                }
                Some(StreamEvent::Error(reason)) => {
                    stream.close();
                    self.release_stream_slot();
                    self.finish_cycle(Some(reason));
                    return;
                }
                Some(StreamEvent::Delta(delta)) => {
                    let finished = delta.is_finished;
                    let mut found = false;
                    self.service.update_state(|mut s| {
                        if let Some(index) =
                            s.messages.iter().position(|m| m.position == position)
                        {
                            found = true;
                            let updated = s.messages[index]
                                .clone()
                                .with_teacher_delta(&delta.delta)
                                .with_finished(delta.is_finished)
                                .with_learning_phrases(delta.learning_phrases.clone());
                            s.messages[index] = updated;
                        }
                        s
                    });

                    if !found {
                        stream.close();
                        self.release_stream_slot();
                        self.finish_cycle(Some(format!(
                            "reply stream references unknown message position {position}"
                        )));
                        return;
                    }
                    if finished {
                        stream.close();
                        self.release_stream_slot();
                        self.finish_cycle(None);
                        return;
                    }
                }
            }
        }
    }

    /// Ends a cycle: clears the thinking flag and records (or clears) the
    /// failure reason. The placeholder message keeps whatever partial
    /// teacher text it accumulated.
    fn finish_cycle(&self, error_reason: Option<String>) {
        self.service
            .update_state(|s| s.with_thinking(false).with_error_reason(error_reason));
    }

    /// Aborts the in-flight drive task, which drops (and thereby closes)
    /// its stream.
    fn teardown_stream(&self) {
        if let Some(handle) = self
            .active_stream
            .lock()
            .expect("stream slot poisoned")
            .take()
        {
            handle.task.abort();
        }
    }

    /// Clears the stream slot from within the drive task, without aborting.
    fn release_stream_slot(&self) {
        let _ = self
            .active_stream
            .lock()
            .expect("stream slot poisoned")
            .take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GlossaError, Result};
    use crate::language;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::{mpsc, oneshot};

    fn conversation(id: &str) -> Conversation {
        Conversation {
            id: id.to_string(),
            primary: language::by_key("english").unwrap().clone(),
            learning: language::by_key("spanish").unwrap().clone(),
        }
    }

    fn loaded_message(conversation_id: &str, position: u32) -> ChatMessage {
        ChatMessage {
            conversation_id: conversation_id.to_string(),
            position,
            user_text: format!("user {position}"),
            teacher_text: Some(format!("teacher {position}")),
            is_finished: true,
            finish_reason: None,
            learning_phrases: None,
        }
    }

    #[derive(Default)]
    struct MockApi {
        conversations: Mutex<Vec<Conversation>>,
        messages: Mutex<HashMap<String, Vec<ChatMessage>>>,
        /// receivers a load_messages call must wait on before returning
        load_gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
        list_calls: AtomicUsize,
        load_calls: AtomicUsize,
        fail_list: Mutex<bool>,
        fail_create: Mutex<bool>,
        /// None = transport error, Some(ok) = server answer
        delete_answer: Mutex<Option<bool>>,
        delete_messages_answer: Mutex<Option<bool>>,
        fail_open: Mutex<bool>,
        stream_tx: Mutex<Option<mpsc::UnboundedSender<StreamEvent>>>,
    }

    impl MockApi {
        fn with_conversations(conversations: Vec<Conversation>) -> Self {
            let api = Self::default();
            *api.conversations.lock().unwrap() = conversations;
            *api.delete_answer.lock().unwrap() = Some(true);
            *api.delete_messages_answer.lock().unwrap() = Some(true);
            api
        }

        fn stream_sender(&self) -> mpsc::UnboundedSender<StreamEvent> {
            self.stream_tx.lock().unwrap().clone().expect("no stream open")
        }

        fn delta(&self, text: &str, finished: bool, phrases: Option<Vec<String>>) {
            self.stream_sender()
                .send(StreamEvent::Delta(super::super::api::ReplyDelta {
                    delta: text.to_string(),
                    is_finished: finished,
                    learning_phrases: phrases,
                }))
                .unwrap();
        }
    }

    #[async_trait]
    impl LanguageCoachApi for MockApi {
        async fn list_conversations(&self) -> Result<Vec<Conversation>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if *self.fail_list.lock().unwrap() {
                return Err(GlossaError::transport("list unreachable"));
            }
            Ok(self.conversations.lock().unwrap().clone())
        }

        async fn create_conversation(
            &self,
            primary: &Language,
            learning: &Language,
        ) -> Result<Conversation> {
            if *self.fail_create.lock().unwrap() {
                return Err(GlossaError::transport("create unreachable"));
            }
            Ok(Conversation {
                id: "created".to_string(),
                primary: primary.clone(),
                learning: learning.clone(),
            })
        }

        async fn delete_conversation(&self, conversation_id: &str) -> Result<bool> {
            match *self.delete_answer.lock().unwrap() {
                None => Err(GlossaError::transport("delete unreachable")),
                Some(false) => Ok(false),
                Some(true) => {
                    self.conversations
                        .lock()
                        .unwrap()
                        .retain(|c| c.id != conversation_id);
                    Ok(true)
                }
            }
        }

        async fn load_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>> {
            self.load_calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.load_gates.lock().unwrap().remove(conversation_id);
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            Ok(self
                .messages
                .lock()
                .unwrap()
                .get(conversation_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn delete_messages(&self, _conversation_id: &str, _from: u32) -> Result<bool> {
            match *self.delete_messages_answer.lock().unwrap() {
                None => Err(GlossaError::transport("delete messages unreachable")),
                Some(answer) => Ok(answer),
            }
        }

        async fn open_reply_stream(
            &self,
            _conversation_id: &str,
            _user_text: &str,
        ) -> Result<ReplyStream> {
            if *self.fail_open.lock().unwrap() {
                return Err(GlossaError::transport("stream unreachable"));
            }
            let (events, _cancel, stream) = ReplyStream::open();
            *self.stream_tx.lock().unwrap() = Some(events);
            Ok(stream)
        }
    }

    fn coach(api: Arc<MockApi>) -> Arc<CoachService> {
        Arc::new(CoachService::new(api))
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    async fn start_send(service: &Arc<CoachService>, input: &str) {
        service.update_options(|o| o.with_input_text(Some(input.to_string())));
        assert!(service.send().await);
    }

    #[tokio::test]
    async fn send_rejects_missing_input_without_mutation() {
        let api = Arc::new(MockApi::with_conversations(vec![]));
        let service = coach(api.clone());
        service
            .create_conversation(
                language::by_key("english").unwrap(),
                language::by_key("spanish").unwrap(),
            )
            .await
            .unwrap();

        service.update_options(|o| o.with_input_text(Some("   ".to_string())));
        assert!(!service.send().await);

        let state = service.state();
        assert!(!state.is_thinking);
        assert!(state.messages.is_empty());
        // the unusable input is not consumed
        assert_eq!(service.options().input_text.as_deref(), Some("   "));
    }

    #[tokio::test]
    async fn send_rejects_missing_conversation() {
        let api = Arc::new(MockApi::with_conversations(vec![]));
        let service = coach(api.clone());

        service.update_options(|o| o.with_input_text(Some("Hello".to_string())));
        assert!(!service.send().await);
        assert!(!service.state().is_thinking);
        assert_eq!(service.options().input_text.as_deref(), Some("Hello"));
    }

    #[tokio::test]
    async fn send_streams_reply_to_completion() {
        let api = Arc::new(MockApi::with_conversations(vec![]));
        let service = coach(api.clone());
        service
            .create_conversation(
                language::by_key("english").unwrap(),
                language::by_key("spanish").unwrap(),
            )
            .await
            .unwrap();

        start_send(&service, "Hello").await;

        let state = service.state();
        assert!(state.is_thinking);
        assert!(service.options().input_text.is_none());
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].position, 0);
        assert_eq!(state.messages[0].user_text, "Hello");
        assert_eq!(state.messages[0].teacher_text.as_deref(), Some(""));
        assert!(!state.messages[0].is_finished);

        api.delta("Hel", false, None);
        wait_for(|| {
            service.state().messages[0].teacher_text.as_deref() == Some("Hel")
        })
        .await;

        api.delta("lo", true, Some(vec!["Hello".to_string()]));
        wait_for(|| !service.state().is_thinking).await;

        let state = service.state();
        let message = &state.messages[0];
        assert_eq!(message.teacher_text.as_deref(), Some("Hello"));
        assert!(message.is_finished);
        assert_eq!(
            message.learning_phrases.as_deref(),
            Some(["Hello".to_string()].as_slice())
        );
        assert!(state.error_reason.is_none());
    }

    #[tokio::test]
    async fn transport_failure_preserves_partial_text() {
        let api = Arc::new(MockApi::with_conversations(vec![]));
        let service = coach(api.clone());
        service
            .create_conversation(
                language::by_key("english").unwrap(),
                language::by_key("spanish").unwrap(),
            )
            .await
            .unwrap();

        start_send(&service, "Hello").await;
        api.delta("Hel", false, None);
        wait_for(|| {
            service.state().messages[0].teacher_text.as_deref() == Some("Hel")
        })
        .await;

        api.stream_sender()
            .send(StreamEvent::Error("connection reset".to_string()))
            .unwrap();
        wait_for(|| !service.state().is_thinking).await;

        let state = service.state();
        assert_eq!(state.messages[0].teacher_text.as_deref(), Some("Hel"));
        assert!(!state.messages[0].is_finished);
        assert_eq!(state.error_reason.as_deref(), Some("connection reset"));
    }

    #[tokio::test]
    async fn stream_closing_early_fails_the_cycle() {
        let api = Arc::new(MockApi::with_conversations(vec![]));
        let service = coach(api.clone());
        service
            .create_conversation(
                language::by_key("english").unwrap(),
                language::by_key("spanish").unwrap(),
            )
            .await
            .unwrap();

        start_send(&service, "Hello").await;
        api.stream_tx.lock().unwrap().take();

        wait_for(|| !service.state().is_thinking).await;
        assert!(service.state().error_reason.is_some());
    }

    #[tokio::test]
    async fn delta_for_vanished_position_is_a_protocol_error() {
        let api = Arc::new(MockApi::with_conversations(vec![conversation("c1")]));
        let service = coach(api.clone());
        service.load_conversations().await;
        service.select_conversation(Some("c1"));
        wait_for(|| service.state().conversation.is_some()).await;

        start_send(&service, "Hello").await;
        // concurrent deletion removes the reserved slot
        assert!(service.delete_messages_from("c1", 0).await);
        assert!(service.state().messages.is_empty());

        api.delta("Hel", false, None);
        wait_for(|| !service.state().is_thinking).await;
        assert!(
            service
                .state()
                .error_reason
                .unwrap()
                .contains("position")
        );
    }

    #[tokio::test]
    async fn new_send_tears_down_previous_stream() {
        let api = Arc::new(MockApi::with_conversations(vec![]));
        let service = coach(api.clone());
        service
            .create_conversation(
                language::by_key("english").unwrap(),
                language::by_key("spanish").unwrap(),
            )
            .await
            .unwrap();

        start_send(&service, "first").await;
        let first_sender = api.stream_sender();

        start_send(&service, "second").await;
        wait_for(|| first_sender.is_closed()).await;

        // the second cycle proceeds normally at the next position
        assert_eq!(service.state().messages.len(), 2);
        assert_eq!(service.state().messages[1].position, 1);
        api.delta("¡Hola!", true, None);
        wait_for(|| !service.state().is_thinking).await;
        assert_eq!(
            service.state().messages[1].teacher_text.as_deref(),
            Some("¡Hola!")
        );
    }

    #[tokio::test]
    async fn cancel_send_is_idempotent_and_clears_thinking() {
        let api = Arc::new(MockApi::with_conversations(vec![]));
        let service = coach(api.clone());
        service
            .create_conversation(
                language::by_key("english").unwrap(),
                language::by_key("spanish").unwrap(),
            )
            .await
            .unwrap();

        start_send(&service, "Hello").await;
        let sender = api.stream_sender();

        service.cancel_send();
        assert!(!service.state().is_thinking);
        wait_for(|| sender.is_closed()).await;

        service.cancel_send();
        assert!(!service.state().is_thinking);
    }

    #[tokio::test]
    async fn stalled_stream_times_out() {
        let api = Arc::new(MockApi::with_conversations(vec![]));
        let service = Arc::new(
            CoachService::new(api.clone())
                .with_stream_idle_timeout(Duration::from_millis(40)),
        );
        service
            .create_conversation(
                language::by_key("english").unwrap(),
                language::by_key("spanish").unwrap(),
            )
            .await
            .unwrap();

        start_send(&service, "Hello").await;
        wait_for(|| !service.state().is_thinking).await;
        assert!(service.state().error_reason.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn open_failure_fails_the_cycle_but_keeps_placeholder() {
        let api = Arc::new(MockApi::with_conversations(vec![]));
        *api.fail_open.lock().unwrap() = true;
        let service = coach(api.clone());
        service
            .create_conversation(
                language::by_key("english").unwrap(),
                language::by_key("spanish").unwrap(),
            )
            .await
            .unwrap();

        service.update_options(|o| o.with_input_text(Some("Hello".to_string())));
        assert!(!service.send().await);

        let state = service.state();
        assert!(!state.is_thinking);
        assert_eq!(state.messages.len(), 1);
        assert!(state.error_reason.is_some());
    }

    #[tokio::test]
    async fn select_conversation_loads_messages_once() {
        let api = Arc::new(MockApi::with_conversations(vec![conversation("c1")]));
        api.messages
            .lock()
            .unwrap()
            .insert("c1".to_string(), vec![loaded_message("c1", 0)]);
        let service = coach(api.clone());
        service.load_conversations().await;

        service.select_conversation(Some("c1"));
        wait_for(|| !service.state().messages.is_empty()).await;
        assert_eq!(api.load_calls.load(Ordering::SeqCst), 1);

        // selecting the active conversation again neither clears nor reloads
        service.select_conversation(Some("c1"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(api.load_calls.load(Ordering::SeqCst), 1);
        assert!(!service.state().messages.is_empty());
    }

    #[tokio::test]
    async fn select_unknown_or_none_clears_selection() {
        let api = Arc::new(MockApi::with_conversations(vec![conversation("c1")]));
        let service = coach(api.clone());
        service.load_conversations().await;
        service.select_conversation(Some("c1"));
        wait_for(|| service.state().conversation.is_some()).await;

        service.select_conversation(Some("missing"));
        let state = service.state();
        assert!(state.conversation.is_none());
        assert!(state.messages.is_empty());

        service.select_conversation(None);
        assert!(service.state().conversation.is_none());
    }

    #[tokio::test]
    async fn overtaken_message_load_is_discarded() {
        let api = Arc::new(MockApi::with_conversations(vec![
            conversation("c1"),
            conversation("c2"),
        ]));
        api.messages.lock().unwrap().insert(
            "c1".to_string(),
            vec![loaded_message("c1", 0), loaded_message("c1", 1)],
        );
        api.messages
            .lock()
            .unwrap()
            .insert("c2".to_string(), vec![loaded_message("c2", 0)]);

        let (gate_tx, gate_rx) = oneshot::channel();
        api.load_gates.lock().unwrap().insert("c1".to_string(), gate_rx);

        let service = coach(api.clone());
        service.load_conversations().await;

        service.select_conversation(Some("c1")); // load blocked on the gate
        service.select_conversation(Some("c2"));
        wait_for(|| service.state().messages.len() == 1).await;

        gate_tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        // the stale c1 load resolved late and must not overwrite c2's log
        let state = service.state();
        assert_eq!(state.conversation.unwrap().id, "c2");
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].conversation_id, "c2");
    }

    #[tokio::test]
    async fn create_conversation_failure_surfaces_reason() {
        let api = Arc::new(MockApi::with_conversations(vec![]));
        *api.fail_create.lock().unwrap() = true;
        let service = coach(api.clone());

        let created = service
            .create_conversation(
                language::by_key("english").unwrap(),
                language::by_key("spanish").unwrap(),
            )
            .await;

        assert!(created.is_none());
        assert!(service.state().error_reason.is_some());
        assert!(service.state().conversation.is_none());
    }

    #[tokio::test]
    async fn load_conversations_failure_keeps_previous_list() {
        let api = Arc::new(MockApi::with_conversations(vec![conversation("c1")]));
        let service = coach(api.clone());

        assert_eq!(service.load_conversations().await.len(), 1);

        *api.fail_list.lock().unwrap() = true;
        assert!(service.load_conversations().await.is_empty());
        assert_eq!(service.state().conversations.len(), 1);
    }

    #[tokio::test]
    async fn delete_conversation_refetches_list_on_success() {
        let api = Arc::new(MockApi::with_conversations(vec![
            conversation("c1"),
            conversation("c2"),
        ]));
        api.messages
            .lock()
            .unwrap()
            .insert("c1".to_string(), vec![loaded_message("c1", 0)]);
        let service = coach(api.clone());
        service.load_conversations().await;
        service.select_conversation(Some("c1"));
        wait_for(|| !service.state().messages.is_empty()).await;

        assert!(service.delete_conversation("c1").await);

        let state = service.state();
        assert!(state.conversation.is_none());
        assert!(state.messages.is_empty());
        let remaining: Vec<&str> = state.conversations.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(remaining, vec!["c2"]);
    }

    #[tokio::test]
    async fn delete_conversation_failure_rolls_back_active_state() {
        let api = Arc::new(MockApi::with_conversations(vec![conversation("c1")]));
        api.messages
            .lock()
            .unwrap()
            .insert("c1".to_string(), vec![loaded_message("c1", 0)]);
        *api.delete_answer.lock().unwrap() = None; // transport error
        let service = coach(api.clone());
        service.load_conversations().await;
        service.select_conversation(Some("c1"));
        wait_for(|| !service.state().messages.is_empty()).await;

        assert!(!service.delete_conversation("c1").await);

        let state = service.state();
        assert_eq!(state.conversation.unwrap().id, "c1");
        assert_eq!(state.messages.len(), 1);
        assert!(state.error_reason.is_some());
    }

    #[tokio::test]
    async fn delete_unknown_conversation_is_rejected() {
        let api = Arc::new(MockApi::with_conversations(vec![]));
        let service = coach(api.clone());
        assert!(!service.delete_conversation("ghost").await);
        assert!(service.state().error_reason.is_none());
    }

    #[tokio::test]
    async fn delete_messages_truncates_only_after_confirmation() {
        let api = Arc::new(MockApi::with_conversations(vec![conversation("c1")]));
        api.messages.lock().unwrap().insert(
            "c1".to_string(),
            (0..4).map(|p| loaded_message("c1", p)).collect(),
        );
        let service = coach(api.clone());
        service.load_conversations().await;
        service.select_conversation(Some("c1"));
        wait_for(|| service.state().messages.len() == 4).await;

        assert!(service.delete_messages_from("c1", 2).await);
        let positions: Vec<u32> = service
            .state()
            .messages
            .iter()
            .map(|m| m.position)
            .collect();
        assert_eq!(positions, vec![0, 1]);

        *api.delete_messages_answer.lock().unwrap() = Some(false);
        assert!(!service.delete_messages_from("c1", 0).await);
        assert_eq!(service.state().messages.len(), 2);
    }
}
