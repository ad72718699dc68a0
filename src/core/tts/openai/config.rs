//! Request parameters for OpenAI's Audio Speech API.

use serde::{Deserialize, Serialize};

/// Speech models accepted by `/v1/audio/speech`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OpenAITTSModel {
    /// Lowest latency, the right default for conversational playback
    #[default]
    #[serde(rename = "tts-1")]
    Tts1,
    #[serde(rename = "tts-1-hd")]
    Tts1Hd,
    #[serde(rename = "gpt-4o-mini-tts")]
    Gpt4oMiniTts,
}

impl OpenAITTSModel {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tts1 => "tts-1",
            Self::Tts1Hd => "tts-1-hd",
            Self::Gpt4oMiniTts => "gpt-4o-mini-tts",
        }
    }

    /// Parse a model name, falling back to `tts-1` for anything unknown.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "tts-1-hd" | "tts1-hd" | "tts1hd" => Self::Tts1Hd,
            "gpt-4o-mini-tts" | "gpt4o-mini-tts" => Self::Gpt4oMiniTts,
            _ => Self::Tts1,
        }
    }
}

const VOICES: &[&str] = &[
    "alloy", "ash", "ballad", "coral", "echo", "fable", "onyx", "nova", "sage", "shimmer", "verse",
];

/// A validated OpenAI voice name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenAIVoice(&'static str);

impl Default for OpenAIVoice {
    fn default() -> Self {
        Self("alloy")
    }
}

impl OpenAIVoice {
    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// Case-insensitive lookup; unknown names fall back to `alloy`.
    pub fn from_str_or_default(s: &str) -> Self {
        let wanted = s.trim().to_lowercase();
        VOICES
            .iter()
            .find(|v| **v == wanted)
            .map(|v| Self(*v))
            .unwrap_or_default()
    }

    pub fn all() -> impl Iterator<Item = OpenAIVoice> {
        VOICES.iter().map(|v| Self(*v))
    }
}

/// Encodings the speech endpoint can return. All are 24kHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioOutputFormat {
    #[default]
    Mp3,
    Opus,
    Aac,
    Flac,
    Wav,
    /// 16-bit signed little-endian mono
    Pcm,
}

impl AudioOutputFormat {
    pub const SAMPLE_RATE: u32 = 24_000;

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Opus => "opus",
            Self::Aac => "aac",
            Self::Flac => "flac",
            Self::Wav => "wav",
            Self::Pcm => "pcm",
        }
    }

    pub fn from_str_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "opus" => Self::Opus,
            "aac" => Self::Aac,
            "flac" => Self::Flac,
            "wav" => Self::Wav,
            "pcm" | "linear16" | "raw" => Self::Pcm,
            _ => Self::Mp3,
        }
    }
}
