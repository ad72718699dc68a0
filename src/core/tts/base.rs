//! Base types for speech synthesis collaborators.
//!
//! A [`SynthesisClient`] turns one sentence of text into one complete audio
//! payload. Implementations are stateless request/response clients; the
//! caller (the synthesis dispatcher) owns concurrency limiting, ordering and
//! cancellation, and no retries happen inside the client.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while synthesizing speech.
#[derive(Debug, Error)]
pub enum TTSError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Audio generation failed: {0}")]
    AudioGenerationFailed(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Request timed out: {0}")]
    Timeout(String),
}

impl TTSError {
    /// Whether a caller-side retry could plausibly succeed.
    ///
    /// The dispatcher never retries; this is exposed for clients that wrap a
    /// [`SynthesisClient`] with their own retry policy.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkError(_) | Self::RateLimited(_) | Self::Timeout(_)
        )
    }
}

pub type TTSResult<T> = Result<T, TTSError>;

/// One synthesized audio payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioData {
    /// Encoded audio bytes exactly as returned by the provider
    pub data: Bytes,
    /// Container/codec name, e.g. "mp3" or "pcm"
    pub format: String,
    pub sample_rate: u32,
}

impl AudioData {
    pub fn new(data: impl Into<Bytes>, format: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            data: data.into(),
            format: format.into(),
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Provider-agnostic TTS settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TTSConfig {
    pub provider: String,
    pub api_key: String,
    pub voice_id: Option<String>,
    pub model: String,
    pub audio_format: Option<String>,
    /// Playback speed multiplier, provider-clamped
    pub speaking_rate: Option<f32>,
    /// Overrides the provider's default endpoint URL
    pub endpoint: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for TTSConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            api_key: String::new(),
            voice_id: None,
            model: String::new(),
            audio_format: None,
            speaking_rate: None,
            endpoint: None,
            request_timeout_ms: 30_000,
        }
    }
}

/// Text-to-speech collaborator used by the synthesis dispatcher.
#[async_trait]
pub trait SynthesisClient: Send + Sync {
    /// Synthesize `text` into a complete audio payload.
    async fn synthesize(&self, text: &str) -> TTSResult<AudioData>;

    /// Short provider identifier for logs.
    fn provider_name(&self) -> &'static str;
}
