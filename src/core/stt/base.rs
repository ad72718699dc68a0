//! Base types for streaming transcription collaborators.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum STTError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Not connected")]
    NotConnected,
}

pub type STTResult<T> = Result<T, STTError>;

/// One transcript update from the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub text: String,
    /// The text for this audio segment will not change again
    pub is_final: bool,
    /// The speaker paused; the utterance is complete
    pub speech_final: bool,
}

impl TranscriptEvent {
    pub fn new(text: impl Into<String>, is_final: bool, speech_final: bool) -> Self {
        Self {
            text: text.into(),
            is_final,
            speech_final,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct STTConfig {
    pub provider: String,
    pub api_key: String,
    pub model: String,
    pub language: String,
    pub sample_rate: u32,
    pub connect_timeout_ms: u64,
    /// Overrides the provider's websocket URL
    pub endpoint: Option<String>,
}

impl Default for STTConfig {
    fn default() -> Self {
        Self {
            provider: "deepgram".to_string(),
            api_key: String::new(),
            model: "nova-2".to_string(),
            language: "en-US".to_string(),
            sample_rate: 16000,
            connect_timeout_ms: 10_000,
            endpoint: None,
        }
    }
}

/// Live speech-to-text collaborator.
///
/// Audio goes in through [`send_audio`](Self::send_audio); transcript
/// updates come out of the receiver returned by
/// [`take_events`](Self::take_events). The receiver closes when the
/// connection ends.
#[async_trait]
pub trait TranscriptionSource: Send {
    /// Open the provider connection, bounded by the configured connect timeout.
    async fn connect(&mut self) -> STTResult<()>;

    async fn send_audio(&mut self, audio: Bytes) -> STTResult<()>;

    async fn disconnect(&mut self) -> STTResult<()>;

    fn is_ready(&self) -> bool;

    /// Hand out the event receiver. Returns `None` after the first call.
    fn take_events(&mut self) -> Option<mpsc::Receiver<TranscriptEvent>>;

    fn provider_name(&self) -> &'static str;
}
