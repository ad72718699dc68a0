//! OpenAI speech synthesis client.
//!
//! # API Reference
//!
//! - Endpoint: `POST https://api.openai.com/v1/audio/speech`
//! - Models: tts-1, tts-1-hd, gpt-4o-mini-tts
//! - Output: mp3, opus, aac, flac, wav, pcm (24kHz)
//! - Speed: 0.25 to 4.0
//!
//! One request per sentence; the full response body is the audio payload.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use tracing::debug;

use super::config::{AudioOutputFormat, OpenAITTSModel, OpenAIVoice};
use crate::core::tts::base::{AudioData, SynthesisClient, TTSConfig, TTSError, TTSResult};

/// OpenAI TTS API endpoint
pub const OPENAI_TTS_URL: &str = "https://api.openai.com/v1/audio/speech";

const MIN_SPEED: f32 = 0.25;
const MAX_SPEED: f32 = 4.0;

/// Builds speech requests from parsed settings.
#[derive(Debug, Clone)]
struct OpenAIRequestBuilder {
    api_key: String,
    endpoint: String,
    model: OpenAITTSModel,
    voice: OpenAIVoice,
    response_format: AudioOutputFormat,
    speed: f32,
}

impl OpenAIRequestBuilder {
    fn from_config(config: &TTSConfig) -> Self {
        let model = if config.model.is_empty() {
            OpenAITTSModel::default()
        } else {
            OpenAITTSModel::from_str_or_default(&config.model)
        };

        Self {
            api_key: config.api_key.clone(),
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| OPENAI_TTS_URL.to_string()),
            model,
            voice: config
                .voice_id
                .as_deref()
                .map(OpenAIVoice::from_str_or_default)
                .unwrap_or_default(),
            response_format: config
                .audio_format
                .as_deref()
                .map(AudioOutputFormat::from_str_or_default)
                .unwrap_or_default(),
            speed: config
                .speaking_rate
                .unwrap_or(1.0)
                .clamp(MIN_SPEED, MAX_SPEED),
        }
    }

    fn body(&self, text: &str) -> serde_json::Value {
        let mut body = json!({
            "model": self.model.as_str(),
            "input": text,
            "voice": self.voice.as_str(),
            "response_format": self.response_format.as_str(),
        });

        if (self.speed - 1.0).abs() > 0.001 {
            body["speed"] = json!(self.speed);
        }
        body
    }

    fn build_http_request(&self, client: &reqwest::Client, text: &str) -> reqwest::RequestBuilder {
        client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.body(text))
    }
}

/// [`SynthesisClient`] backed by OpenAI's Audio Speech API.
pub struct OpenAITTS {
    client: reqwest::Client,
    request_builder: OpenAIRequestBuilder,
}

impl OpenAITTS {
    pub fn new(config: TTSConfig) -> TTSResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(TTSError::InvalidConfiguration(
                "OpenAI API key is required for speech synthesis".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| TTSError::InvalidConfiguration(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            request_builder: OpenAIRequestBuilder::from_config(&config),
        })
    }

    pub fn model(&self) -> OpenAITTSModel {
        self.request_builder.model
    }

    pub fn voice(&self) -> OpenAIVoice {
        self.request_builder.voice
    }

    pub fn response_format(&self) -> AudioOutputFormat {
        self.request_builder.response_format
    }

    pub fn speed(&self) -> f32 {
        self.request_builder.speed
    }
}

#[async_trait]
impl SynthesisClient for OpenAITTS {
    async fn synthesize(&self, text: &str) -> TTSResult<AudioData> {
        if text.trim().is_empty() {
            return Err(TTSError::AudioGenerationFailed("empty input text".to_string()));
        }

        let response = self
            .request_builder
            .build_http_request(&self.client, text)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TTSError::Timeout(e.to_string())
                } else if e.is_connect() {
                    TTSError::ConnectionFailed(e.to_string())
                } else {
                    TTSError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => TTSError::RateLimited(body),
                _ => TTSError::ProviderError(format!("{status}: {body}")),
            });
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| TTSError::NetworkError(e.to_string()))?;

        if data.is_empty() {
            return Err(TTSError::AudioGenerationFailed(
                "provider returned no audio".to_string(),
            ));
        }

        debug!(
            bytes = data.len(),
            chars = text.len(),
            "OpenAI synthesis complete"
        );

        Ok(AudioData {
            data,
            format: self.request_builder.response_format.as_str().to_string(),
            sample_rate: AudioOutputFormat::SAMPLE_RATE,
        })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> TTSConfig {
        TTSConfig {
            provider: "openai".to_string(),
            api_key: "test_key".to_string(),
            voice_id: Some("nova".to_string()),
            model: "tts-1".to_string(),
            audio_format: Some("pcm".to_string()),
            endpoint: Some(format!("{}/v1/audio/speech", server.uri())),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let result = OpenAITTS::new(TTSConfig::default());
        assert!(matches!(result, Err(TTSError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_speed_is_clamped() {
        let tts = OpenAITTS::new(TTSConfig {
            api_key: "k".to_string(),
            speaking_rate: Some(9.0),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(tts.speed(), 4.0);

        let tts = OpenAITTS::new(TTSConfig {
            api_key: "k".to_string(),
            speaking_rate: Some(0.1),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(tts.speed(), 0.25);
    }

    #[test]
    fn test_defaults() {
        let tts = OpenAITTS::new(TTSConfig {
            api_key: "k".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(tts.model(), OpenAITTSModel::Tts1);
        assert_eq!(tts.voice().as_str(), "alloy");
        assert_eq!(tts.response_format(), AudioOutputFormat::Mp3);
        assert_eq!(tts.provider_name(), "openai");
    }

    #[test]
    fn test_body_omits_default_speed() {
        let builder = OpenAIRequestBuilder::from_config(&TTSConfig {
            api_key: "k".to_string(),
            ..Default::default()
        });
        let body = builder.body("Hello.");
        assert_eq!(body["input"], "Hello.");
        assert_eq!(body["model"], "tts-1");
        assert!(body.get("speed").is_none());
    }

    #[tokio::test]
    async fn test_synthesize_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/speech"))
            .and(header("authorization", "Bearer test_key"))
            .and(body_partial_json(json!({
                "input": "Hello there.",
                "voice": "nova",
                "response_format": "pcm"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8, 1, 2, 3]))
            .expect(1)
            .mount(&server)
            .await;

        let tts = OpenAITTS::new(config_for(&server)).unwrap();
        let audio = tts.synthesize("Hello there.").await.unwrap();

        assert_eq!(audio.data.as_ref(), &[0u8, 1, 2, 3]);
        assert_eq!(audio.format, "pcm");
        assert_eq!(audio.sample_rate, 24000);
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let tts = OpenAITTS::new(config_for(&server)).unwrap();
        let err = tts.synthesize("Hi there.").await.unwrap_err();
        assert!(matches!(err, TTSError::RateLimited(ref body) if body == "slow down"));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_server_error_maps_to_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let tts = OpenAITTS::new(config_for(&server)).unwrap();
        let err = tts.synthesize("Hi there.").await.unwrap_err();
        match err {
            TTSError::ProviderError(msg) => {
                assert!(msg.contains("500"));
                assert!(msg.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_body_is_generation_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let tts = OpenAITTS::new(config_for(&server)).unwrap();
        let err = tts.synthesize("Hi there.").await.unwrap_err();
        assert!(matches!(err, TTSError::AudioGenerationFailed(_)));
    }

    #[tokio::test]
    async fn test_empty_text_never_hits_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8]))
            .expect(0)
            .mount(&server)
            .await;

        let tts = OpenAITTS::new(config_for(&server)).unwrap();
        assert!(tts.synthesize("   ").await.is_err());
    }
}
