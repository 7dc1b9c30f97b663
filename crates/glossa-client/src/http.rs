//! HTTP implementation of the language-coach collaborator contract.
//!
//! Talks to the coach API over its plain JSON endpoints plus one
//! `text/event-stream` endpoint for streamed teacher replies.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use glossa_core::coach::{ChatMessage, Conversation, LanguageCoachApi, ReplyStream};
use glossa_core::language::{self, Language};
use glossa_core::{GlossaError, Result};

use crate::config::ClientConfig;
use crate::sse;

/// Language-coach API client.
pub struct HttpLanguageCoachApi {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpLanguageCoachApi {
    /// Creates a client for the API at `config.api_base`.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|err| GlossaError::transport(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.base_url)
    }

    /// Converts a non-success response into a transport error carrying the
    /// status and whatever body the server produced.
    async fn check_status(url: &str, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read error body".to_string());
        Err(GlossaError::transport(format!(
            "HTTP {status} from {url}: {body}"
        )))
    }

    async fn get_json<T>(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = self.url(endpoint);
        let response = self
            .client
            .get(&url)
            .query(query)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|err| GlossaError::transport(format!("request to {url} failed: {err}")))?;
        let response = Self::check_status(&url, response).await?;
        response
            .json()
            .await
            .map_err(|err| GlossaError::transport(format!("invalid response from {url}: {err}")))
    }

    async fn post_json<B: Serialize>(&self, endpoint: &str, body: &B) -> Result<StatusResponse> {
        let url = self.url(endpoint);
        let response = self
            .client
            .post(&url)
            .json(body)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|err| GlossaError::transport(format!("request to {url} failed: {err}")))?;
        let response = Self::check_status(&url, response).await?;
        response
            .json()
            .await
            .map_err(|err| GlossaError::transport(format!("invalid response from {url}: {err}")))
    }
}

#[async_trait]
impl LanguageCoachApi for HttpLanguageCoachApi {
    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let response: ConversationsResponse = self.get_json("conversations", &[]).await?;
        response
            .items
            .into_iter()
            .map(ConversationItem::into_conversation)
            .collect()
    }

    async fn create_conversation(
        &self,
        primary: &Language,
        learning: &Language,
    ) -> Result<Conversation> {
        let response: CreateConversationResponse = self
            .get_json(
                "create-conversation",
                &[("primary", primary.key), ("learning", learning.key)],
            )
            .await?;
        tracing::info!(conversation_id = %response.conversation_id, "conversation created");
        Ok(Conversation {
            id: response.conversation_id,
            primary: primary.clone(),
            learning: learning.clone(),
        })
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<bool> {
        let response = self
            .post_json(
                "delete-conversation",
                &DeleteConversationRequest { conversation_id },
            )
            .await?;
        Ok(response.is_ok())
    }

    async fn load_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>> {
        let response: MessagesResponse = self
            .get_json("messages", &[("conversation_id", conversation_id)])
            .await?;
        tracing::debug!(
            conversation_id,
            item_count = response.items.len(),
            "messages loaded"
        );
        Ok(pair_messages(conversation_id, response.items))
    }

    async fn delete_messages(&self, conversation_id: &str, from_position: u32) -> Result<bool> {
        let response = self
            .post_json(
                "delete-messages",
                &DeleteMessagesRequest {
                    conversation_id,
                    position: from_position,
                },
            )
            .await?;
        Ok(response.is_ok())
    }

    async fn open_reply_stream(
        &self,
        conversation_id: &str,
        user_text: &str,
    ) -> Result<ReplyStream> {
        let url = self.url("send-message");
        // no request timeout here: the stream stays open for the whole reply
        let response = self
            .client
            .get(&url)
            .query(&[("conversation_id", conversation_id), ("message", user_text)])
            .send()
            .await
            .map_err(|err| GlossaError::transport(format!("request to {url} failed: {err}")))?;
        let response = Self::check_status(&url, response).await?;

        let (events, cancel, stream) = ReplyStream::open();
        tokio::spawn(sse::run_stream_worker(response, events, cancel));
        Ok(stream)
    }
}

// ----------------------------------------------------------------------
// Wire types
// ----------------------------------------------------------------------

#[derive(Deserialize)]
struct ConversationsResponse {
    items: Vec<ConversationItem>,
}

#[derive(Deserialize)]
struct ConversationItem {
    conversation_id: String,
    primary: String,
    learning: String,
}

impl ConversationItem {
    fn into_conversation(self) -> Result<Conversation> {
        let primary = language::by_key(&self.primary)
            .ok_or_else(|| GlossaError::protocol(format!("unknown language key {:?}", self.primary)))?;
        let learning = language::by_key(&self.learning).ok_or_else(|| {
            GlossaError::protocol(format!("unknown language key {:?}", self.learning))
        })?;
        Ok(Conversation {
            id: self.conversation_id,
            primary: primary.clone(),
            learning: learning.clone(),
        })
    }
}

#[derive(Deserialize)]
struct CreateConversationResponse {
    conversation_id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
}

impl StatusResponse {
    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    items: Vec<MessageItem>,
}

/// One stored message, one side of a turn.
#[derive(Deserialize)]
struct MessageItem {
    position: u32,
    content: String,
    #[serde(default)]
    learning_phrases: Option<Vec<String>>,
}

#[derive(Serialize)]
struct DeleteConversationRequest<'a> {
    conversation_id: &'a str,
}

#[derive(Serialize)]
struct DeleteMessagesRequest<'a> {
    conversation_id: &'a str,
    position: u32,
}

/// Folds the flat role-alternating message list into paired turns.
///
/// Items arrive position-ordered as (user, teacher, user, teacher, ...); the
/// pair's position is the user item's. A trailing user item without a
/// teacher reply is kept with no teacher text.
fn pair_messages(conversation_id: &str, items: Vec<MessageItem>) -> Vec<ChatMessage> {
    let mut paired = Vec::with_capacity(items.len() / 2 + 1);
    let mut items = items.into_iter();
    while let Some(user) = items.next() {
        let teacher = items.next();
        paired.push(ChatMessage {
            conversation_id: conversation_id.to_string(),
            position: user.position,
            user_text: user.content,
            is_finished: teacher.is_some(),
            teacher_text: teacher.as_ref().map(|t| t.content.clone()),
            finish_reason: None,
            learning_phrases: teacher.and_then(|t| t.learning_phrases),
        });
    }
    paired
}
