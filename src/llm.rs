//! Chat-completion client for answer generation.
//!
//! One trait method wraps `POST {base_url}/chat/completions` so tests can
//! substitute a canned backend. Streaming is intentionally unsupported.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ServicesConfig;
use crate::error::RagError;

/// A single message in a chat exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// One call to the chat-completion endpoint.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, RagError>;
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

/// Chat backend over an OpenAI-compatible endpoint.
pub struct HttpChatBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl HttpChatBackend {
    /// Builds a backend sharing the given connection pool.
    pub fn new(client: reqwest::Client, services: &ServicesConfig) -> Self {
        Self {
            client,
            base_url: services.llamacpp_base_url.trim_end_matches('/').to_string(),
            model: services.chat_model.clone(),
        }
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, RagError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionRequest {
            model: &self.model,
            messages,
            stream: false,
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RagError::UpstreamUnavailable(format!(
                "chat completion API returned {status}: {body_text}"
            )));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            RagError::UpstreamUnavailable(format!("invalid chat completion response: {e}"))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                RagError::UpstreamUnavailable(
                    "no choices returned from chat completion API".to_string(),
                )
            })
    }
}
