//! Configuration module for the WaaV agent server
//!
//! Settings come from .env files, environment variables and an optional YAML
//! file. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Applying YAML overrides on top of the environment
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use waav_agent::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable base
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

use crate::core::llm::LLMConfig;
use crate::core::sentence::{DEFAULT_ABBREVIATIONS, DEFAULT_MIN_SENTENCE_CHARS, SentencePolicy};
use crate::core::stt::STTConfig;
use crate::core::tts::TTSConfig;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly, concise voice assistant. \
Answer in short spoken sentences without lists, markdown or emoji.";

/// Where the synthesis concurrency ceiling applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SynthesisPoolScope {
    /// Each session gets its own K slots
    #[default]
    Session,
    /// All sessions share one pool of K slots (one vendor credential)
    Process,
}

impl SynthesisPoolScope {
    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_lowercase().as_str() {
            "session" => Ok(Self::Session),
            "process" | "global" => Ok(Self::Process),
            other => Err(format!(
                "Invalid synthesis pool scope '{other}'. Expected 'session' or 'process'"
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Process => "process",
        }
    }
}

impl fmt::Display for SynthesisPoolScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server configuration
///
/// Contains everything needed to run the agent server:
/// - Server settings (host, port)
/// - Provider API keys (OpenAI, Deepgram)
/// - LLM, TTS and STT provider settings
/// - Sentence pipeline tuning (K, pool scope, detector policy)
/// - Session lifecycle (history limit, idle reclamation)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // Provider API keys
    pub openai_api_key: Option<String>,
    pub deepgram_api_key: Option<String>,

    // LLM settings
    pub llm_provider: String,
    pub llm_model: String,
    pub llm_base_url: Option<String>,
    pub llm_max_tokens: u32,
    pub llm_temperature: f32,
    pub system_prompt: Option<String>,

    // TTS settings
    pub tts_provider: String,
    pub tts_voice: String,
    pub tts_model: String,
    pub tts_audio_format: String,
    pub tts_speaking_rate: Option<f32>,
    /// Overrides the provider's speech endpoint URL
    pub tts_endpoint: Option<String>,

    // Pipeline settings
    pub synthesis_concurrency: usize,
    pub synthesis_pool_scope: SynthesisPoolScope,
    pub min_sentence_chars: usize,
    /// Empty means the built-in abbreviation set
    pub abbreviations: Vec<String>,

    // Session settings
    pub max_history_messages: usize,
    pub session_idle_timeout_seconds: u64,
    pub session_sweep_interval_seconds: u64,

    // STT settings
    pub stt_provider: String,
    pub stt_model: String,
    pub stt_language: String,
    pub stt_sample_rate: u32,
    pub stt_connect_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            openai_api_key: None,
            deepgram_api_key: None,
            llm_provider: "openai".to_string(),
            llm_model: "gpt-4o-mini".to_string(),
            llm_base_url: None,
            llm_max_tokens: 512,
            llm_temperature: 0.7,
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
            tts_provider: "openai".to_string(),
            tts_voice: "alloy".to_string(),
            tts_model: "tts-1".to_string(),
            tts_audio_format: "mp3".to_string(),
            tts_speaking_rate: None,
            tts_endpoint: None,
            synthesis_concurrency: 1,
            synthesis_pool_scope: SynthesisPoolScope::Session,
            min_sentence_chars: DEFAULT_MIN_SENTENCE_CHARS,
            abbreviations: Vec::new(),
            max_history_messages: 40,
            session_idle_timeout_seconds: 1800,
            session_sweep_interval_seconds: 60,
            stt_provider: "deepgram".to_string(),
            stt_model: "nova-2".to_string(),
            stt_language: "en-US".to_string(),
            stt_sample_rate: 16000,
            stt_connect_timeout_seconds: 10,
        }
    }
}

/// Zeroize secret fields when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.deepgram_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// The `.env` file is loaded into the environment by `main` before this
    /// runs, so real environment variables win over `.env` values.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = env::load_from_env()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with the environment as base.
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;

        let mut config = env::load_from_env()?;
        merge::apply_yaml(&mut config, yaml_config)?;

        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_seconds)
    }

    pub fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session_sweep_interval_seconds)
    }

    /// Sentence detector tuning.
    pub fn sentence_policy(&self) -> SentencePolicy {
        if self.abbreviations.is_empty() {
            SentencePolicy::new(self.min_sentence_chars, DEFAULT_ABBREVIATIONS.iter().copied())
        } else {
            SentencePolicy::new(self.min_sentence_chars, self.abbreviations.iter())
        }
    }

    /// Get the API key for a provider.
    ///
    /// # Errors
    /// Returns an error string if the provider is unknown or its key is not
    /// configured.
    pub fn get_api_key(&self, provider: &str) -> Result<String, String> {
        match provider.to_lowercase().as_str() {
            "openai" => self.openai_api_key.clone().ok_or_else(|| {
                "OpenAI API key not configured in server environment".to_string()
            }),
            "deepgram" => self.deepgram_api_key.clone().ok_or_else(|| {
                "Deepgram API key not configured in server environment".to_string()
            }),
            other => Err(format!("Unsupported provider: {other}")),
        }
    }

    /// Settings for the token source. A missing key stays empty and is
    /// rejected when the provider is constructed.
    pub fn llm_config(&self) -> LLMConfig {
        LLMConfig {
            provider: self.llm_provider.clone(),
            api_key: self.get_api_key(&self.llm_provider).unwrap_or_default(),
            model: self.llm_model.clone(),
            base_url: self.llm_base_url.clone(),
            max_tokens: self.llm_max_tokens,
            temperature: self.llm_temperature,
            ..Default::default()
        }
    }

    pub fn tts_config(&self) -> TTSConfig {
        TTSConfig {
            provider: self.tts_provider.clone(),
            api_key: self.get_api_key(&self.tts_provider).unwrap_or_default(),
            voice_id: Some(self.tts_voice.clone()),
            model: self.tts_model.clone(),
            audio_format: Some(self.tts_audio_format.clone()),
            speaking_rate: self.tts_speaking_rate,
            endpoint: self.tts_endpoint.clone(),
            ..Default::default()
        }
    }

    pub fn stt_config(&self) -> STTConfig {
        STTConfig {
            provider: self.stt_provider.clone(),
            api_key: self.get_api_key(&self.stt_provider).unwrap_or_default(),
            model: self.stt_model.clone(),
            language: self.stt_language.clone(),
            sample_rate: self.stt_sample_rate,
            connect_timeout_ms: self.stt_connect_timeout_seconds * 1000,
            endpoint: None,
        }
    }
}
