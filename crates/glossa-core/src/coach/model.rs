//! Conversation domain model.
//!
//! This module contains the value types the coach service operates on:
//! conversations, paired chat turns, and the service's Options/State pair.
//! All of them are immutable by convention and replaced through explicit
//! `with_*` copy-with-override builders.

use crate::language::Language;

/// A conversation between the user and the teacher.
///
/// Immutable once created; identity is the server-issued `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    /// Server-issued conversation identifier.
    pub id: String,
    /// The language the user already speaks.
    pub primary: Language,
    /// The language the user is learning.
    pub learning: Language,
}

/// One paired turn in a conversation: the user's message and the teacher's
/// (possibly still streaming) reply.
///
/// Positions are unique within a conversation and strictly increasing in the
/// order turns were created. The log is append-only except for explicit
/// truncation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub conversation_id: String,
    pub position: u32,
    pub user_text: String,
    pub teacher_text: Option<String>,
    pub is_finished: bool,
    pub finish_reason: Option<String>,
    pub learning_phrases: Option<Vec<String>>,
}

impl ChatMessage {
    /// The placeholder a streaming reply writes into: empty teacher text,
    /// not finished.
    pub fn pending(conversation_id: impl Into<String>, position: u32, user_text: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            position,
            user_text: user_text.into(),
            teacher_text: Some(String::new()),
            is_finished: false,
            finish_reason: None,
            learning_phrases: None,
        }
    }

    /// Appends a delta to the teacher text. Teacher text accumulates by
    /// concatenation across stream events; it is never replaced wholesale.
    pub fn with_teacher_delta(mut self, delta: &str) -> Self {
        match self.teacher_text {
            Some(ref mut text) => text.push_str(delta),
            None => self.teacher_text = Some(delta.to_string()),
        }
        self
    }

    pub fn with_finished(mut self, is_finished: bool) -> Self {
        self.is_finished = is_finished;
        self
    }

    pub fn with_finish_reason(mut self, finish_reason: Option<String>) -> Self {
        self.finish_reason = finish_reason;
        self
    }

    /// Overwrites the learning phrases with the latest stream event's value.
    pub fn with_learning_phrases(mut self, learning_phrases: Option<Vec<String>>) -> Self {
        self.learning_phrases = learning_phrases;
        self
    }
}

/// Caller-settable input to the coach service.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CoachOptions {
    /// The pending chat input, cleared when a send begins.
    pub input_text: Option<String>,
}

impl CoachOptions {
    pub fn with_input_text(mut self, input_text: Option<String>) -> Self {
        self.input_text = input_text;
        self
    }
}

/// Service-derived state observed by consumers.
///
/// Mutated only by the coach service itself.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CoachState {
    /// True while a teacher reply is being produced.
    pub is_thinking: bool,
    /// The active conversation, if one is selected.
    pub conversation: Option<Conversation>,
    /// All known conversations.
    pub conversations: Vec<Conversation>,
    /// Position-ordered message log of the active conversation.
    pub messages: Vec<ChatMessage>,
    /// Human-readable reason of the last failure, for observers to render.
    pub error_reason: Option<String>,
}

impl CoachState {
    pub fn with_thinking(mut self, is_thinking: bool) -> Self {
        self.is_thinking = is_thinking;
        self
    }

    pub fn with_conversation(mut self, conversation: Option<Conversation>) -> Self {
        self.conversation = conversation;
        self
    }

    pub fn with_conversations(mut self, conversations: Vec<Conversation>) -> Self {
        self.conversations = conversations;
        self
    }

    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_error_reason(mut self, error_reason: Option<String>) -> Self {
        self.error_reason = error_reason;
        self
    }

    /// Linear lookup of a conversation by id.
    pub fn find_conversation(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|conversation| conversation.id == conversation_id)
    }

    /// The position the next appended turn will occupy: one past the last
    /// logged position, or 0 on an empty log.
    pub fn next_position(&self) -> u32 {
        self.messages
            .last()
            .map_or(0, |message| message.position + 1)
    }

    /// Removes every message at or past `position`.
    pub fn truncate_from(mut self, position: u32) -> Self {
        self.messages.retain(|message| message.position < position);
        self
    }
}
