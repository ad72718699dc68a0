mod base;
pub mod openai;

pub use base::{AudioData, SynthesisClient, TTSConfig, TTSError, TTSResult};
pub use openai::{AudioOutputFormat, OPENAI_TTS_URL, OpenAITTS, OpenAITTSModel, OpenAIVoice};

use std::collections::HashMap;
use std::sync::Arc;

/// Names accepted by [`create_synthesis_client`].
pub const SUPPORTED_PROVIDERS: &[&str] = &["openai"];

/// Create a speech synthesis client.
///
/// # Supported Providers
///
/// - `"openai"` - OpenAI Audio Speech API (tts-1, tts-1-hd, gpt-4o-mini-tts)
///
/// # Example
///
/// ```rust,ignore
/// use waav_agent::core::tts::{create_synthesis_client, TTSConfig};
///
/// let config = TTSConfig {
///     api_key: "sk-...".to_string(),
///     voice_id: Some("nova".to_string()),
///     ..Default::default()
/// };
///
/// let client = create_synthesis_client("openai", config)?;
/// ```
pub fn create_synthesis_client(
    provider_type: &str,
    config: TTSConfig,
) -> TTSResult<Arc<dyn SynthesisClient>> {
    match provider_type.trim().to_lowercase().as_str() {
        "openai" | "open-ai" => Ok(Arc::new(OpenAITTS::new(config)?)),
        other => Err(TTSError::InvalidConfiguration(format!(
            "Unsupported TTS provider: {other}. Supported providers: {}",
            SUPPORTED_PROVIDERS.join(", ")
        ))),
    }
}

/// Default endpoint per provider, for diagnostics.
pub fn get_tts_provider_urls() -> HashMap<String, String> {
    let mut urls = HashMap::new();
    urls.insert("openai".to_string(), OPENAI_TTS_URL.to_string());
    urls
}
