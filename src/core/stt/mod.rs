mod base;
pub mod deepgram;
mod utterance;

pub use base::{STTConfig, STTError, STTResult, TranscriptEvent, TranscriptionSource};
pub use deepgram::{DEEPGRAM_STT_URL, DeepgramSTT};
pub use utterance::UtteranceAssembler;

pub const SUPPORTED_PROVIDERS: &[&str] = &["deepgram"];

/// Create a live transcription source. The returned source is not yet
/// connected.
///
/// # Supported Providers
///
/// - `"deepgram"` - Deepgram live streaming (nova-2 by default)
pub fn create_transcription_source(
    provider_type: &str,
    config: STTConfig,
) -> STTResult<Box<dyn TranscriptionSource>> {
    match provider_type.trim().to_lowercase().as_str() {
        "deepgram" => Ok(Box::new(DeepgramSTT::new(config)?)),
        other => Err(STTError::ConfigurationError(format!(
            "Unsupported STT provider: {other}. Supported providers: {}",
            SUPPORTED_PROVIDERS.join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_deepgram() {
        let config = STTConfig {
            api_key: "k".to_string(),
            ..Default::default()
        };
        let source = create_transcription_source("Deepgram", config).unwrap();
        assert_eq!(source.provider_name(), "deepgram");
        assert!(!source.is_ready());
    }

    #[test]
    fn test_unknown_provider() {
        let config = STTConfig {
            api_key: "k".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            create_transcription_source("whisper-local", config),
            Err(STTError::ConfigurationError(_))
        ));
    }
}
