use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// Every field is optional; anything omitted falls back to the environment
/// and then to defaults.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///
/// providers:
///   openai_api_key: "sk-..."
///   deepgram_api_key: "dg-..."
///
/// llm:
///   provider: "openai"
///   model: "gpt-4o-mini"
///   base_url: "https://api.openai.com/v1"
///   max_tokens: 512
///   temperature: 0.7
///   system_prompt: "You are a friendly sales assistant."
///
/// tts:
///   provider: "openai"
///   voice: "alloy"
///   model: "tts-1"
///   audio_format: "mp3"
///   speaking_rate: 1.0
///   endpoint: "https://api.openai.com/v1/audio/speech"
///
/// pipeline:
///   synthesis_concurrency: 2
///   synthesis_pool_scope: "session"   # or "process"
///   min_sentence_chars: 3
///   abbreviations: ["mr", "dr", "etc"]
///
/// session:
///   max_history_messages: 40
///   idle_timeout_seconds: 1800
///   sweep_interval_seconds: 60
///
/// stt:
///   provider: "deepgram"
///   model: "nova-2"
///   language: "en-US"
///   sample_rate: 16000
///   connect_timeout_seconds: 10
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub providers: Option<ProvidersYaml>,
    pub llm: Option<LlmYaml>,
    pub tts: Option<TtsYaml>,
    pub pipeline: Option<PipelineYaml>,
    pub session: Option<SessionYaml>,
    pub stt: Option<SttYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersYaml {
    /// Used for both chat completions and speech synthesis
    pub openai_api_key: Option<String>,
    pub deepgram_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LlmYaml {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TtsYaml {
    pub provider: Option<String>,
    pub voice: Option<String>,
    pub model: Option<String>,
    pub audio_format: Option<String>,
    pub speaking_rate: Option<f32>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PipelineYaml {
    pub synthesis_concurrency: Option<usize>,
    pub synthesis_pool_scope: Option<String>,
    pub min_sentence_chars: Option<usize>,
    pub abbreviations: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub max_history_messages: Option<usize>,
    pub idle_timeout_seconds: Option<u64>,
    pub sweep_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SttYaml {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub language: Option<String>,
    pub sample_rate: Option<u32>,
    pub connect_timeout_seconds: Option<u64>,
}

impl YamlConfig {
    /// Load YAML configuration from file
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
