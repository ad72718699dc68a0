//! Base types for streaming language-model collaborators.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum LLMError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),
}

pub type LLMResult<T> = Result<T, LLMError>;

/// Lazy, finite sequence of text fragments for one turn.
///
/// An `Err` item is terminal; nothing follows it.
pub type TokenStream = Pin<Box<dyn Stream<Item = LLMResult<String>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One role-tagged conversation entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Provider-agnostic LLM settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    pub provider: String,
    pub api_key: String,
    pub model: String,
    /// OpenAI-compatible base URL, e.g. `https://api.openai.com/v1`
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub connect_timeout_ms: u64,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            max_tokens: 512,
            temperature: 0.7,
            connect_timeout_ms: 10_000,
        }
    }
}

/// Streaming chat-completion collaborator.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Start generating a response to `messages`.
    ///
    /// Cancelling `stop` ends the returned stream without yielding further
    /// fragments and releases the upstream connection.
    async fn stream(
        &self,
        messages: Vec<ChatMessage>,
        stop: CancellationToken,
    ) -> LLMResult<TokenStream>;

    fn provider_name(&self) -> &'static str;
}
