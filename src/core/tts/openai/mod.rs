//! OpenAI speech synthesis.
//!
//! Models: `tts-1` (default, lowest latency), `tts-1-hd`, `gpt-4o-mini-tts`.
//! Every output format is 24kHz; `pcm` is 16-bit mono little-endian.

mod config;
mod provider;

pub use config::{AudioOutputFormat, OpenAITTSModel, OpenAIVoice};
pub use provider::{OPENAI_TTS_URL, OpenAITTS};
