//! OpenAI-compatible streaming chat completions.
//!
//! `POST {base_url}/chat/completions` with `stream: true`; the response is a
//! server-sent event stream of `chat.completion.chunk` objects terminated by
//! `data: [DONE]`. Any vendor exposing the same surface works by overriding
//! the base URL.

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::base::{ChatMessage, LLMConfig, LLMError, LLMResult, TokenSource, TokenStream};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

fn extract_api_error_message(event: &Value) -> Option<String> {
    let error = event.get("error")?;
    if let Some(message) = error.get("message").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    if let Some(message) = error.as_str() {
        return Some(message.to_string());
    }
    Some("An error occurred during streaming".to_string())
}

/// Parse one SSE `data` payload into its text fragment, if any.
fn parse_chunk(data: &str) -> LLMResult<Option<String>> {
    let event: Value = serde_json::from_str(data)
        .map_err(|e| LLMError::SerializationError(format!("{e}, data: {data}")))?;

    if let Some(message) = extract_api_error_message(&event) {
        return Err(LLMError::ProviderError(message));
    }

    let chunk: ChatCompletionChunk = serde_json::from_value(event)
        .map_err(|e| LLMError::SerializationError(format!("{e}, data: {data}")))?;

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

/// [`TokenSource`] for OpenAI and compatible chat-completion APIs.
pub struct OpenAIChatStream {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAIChatStream {
    pub fn new(config: LLMConfig) -> LLMResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(LLMError::InvalidConfiguration(
                "API key is required for the chat completion stream".to_string(),
            ));
        }

        // No overall request timeout: a response streams for as long as the
        // model keeps generating.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| LLMError::InvalidConfiguration(format!("HTTP client: {e}")))?;

        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(OPENAI_BASE_URL)
            .trim_end_matches('/');

        Ok(Self {
            client,
            endpoint: format!("{base_url}/chat/completions"),
            api_key: config.api_key,
            model: config.model,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(&self, messages: &[ChatMessage]) -> Value {
        json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "stream": true,
        })
    }
}

#[async_trait]
impl TokenSource for OpenAIChatStream {
    async fn stream(
        &self,
        messages: Vec<ChatMessage>,
        stop: CancellationToken,
    ) -> LLMResult<TokenStream> {
        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(&messages));

        let response = tokio::select! {
            biased;
            _ = stop.cancelled() => {
                debug!("Chat stream stopped before the request completed");
                return Ok(Box::pin(futures::stream::empty()));
            }
            result = request.send() => result.map_err(|e| {
                if e.is_connect() {
                    LLMError::ConnectionFailed(e.to_string())
                } else {
                    LLMError::StreamError(e.to_string())
                }
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => LLMError::RateLimited(body),
                _ => LLMError::ProviderError(format!("{status}: {body}")),
            });
        }

        let mut events = Box::pin(response.bytes_stream().eventsource());

        let fragments = async_stream::stream! {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = stop.cancelled() => {
                        debug!("Chat stream stopped by caller");
                        break;
                    }
                    next = events.next() => next,
                };

                let event = match next {
                    Some(Ok(event)) => event,
                    Some(Err(e)) => {
                        warn!("SSE stream error: {}", e);
                        yield Err(LLMError::StreamError(e.to_string()));
                        break;
                    }
                    None => {
                        debug!("SSE stream closed without [DONE]");
                        break;
                    }
                };

                trace!("Chat SSE: {:?}", event.data);
                if event.data == "[DONE]" {
                    break;
                }

                match parse_chunk(&event.data) {
                    Ok(Some(fragment)) => yield Ok(fragment),
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("Chat stream terminated: {}", e);
                        yield Err(e);
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(fragments))
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}
