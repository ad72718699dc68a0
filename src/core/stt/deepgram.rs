//! Deepgram live transcription over WebSocket.
//!
//! Audio is streamed as raw linear16 PCM binary frames; Deepgram answers with
//! JSON `Results` messages carrying interim and final transcripts plus
//! `speech_final` when its endpointer detects a pause. `UtteranceEnd`
//! messages are surfaced as an empty `speech_final` event so a pending
//! utterance still gets flushed when endpointing misses the pause.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, error, info, warn};
use url::Url;

use super::base::{STTConfig, STTError, STTResult, TranscriptEvent, TranscriptionSource};

pub const DEEPGRAM_STT_URL: &str = "wss://api.deepgram.com/v1/listen";

/// Deepgram drops the socket after ~10s without audio or a keepalive.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);

const ENDPOINTING_MS: u32 = 300;
const UTTERANCE_END_MS: u32 = 1000;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum DeepgramMessage {
    Results(ResultsMessage),
    UtteranceEnd,
    Metadata,
    SpeechStarted,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct ResultsMessage {
    channel: Channel,
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    speech_final: bool,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
}

/// Translate one Deepgram text frame into a transcript event.
pub(crate) fn parse_message(text: &str) -> Option<TranscriptEvent> {
    let message: DeepgramMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Failed to parse Deepgram message: {}", e);
            return None;
        }
    };

    match message {
        DeepgramMessage::Results(results) => {
            let transcript = results
                .channel
                .alternatives
                .into_iter()
                .next()
                .map(|alt| alt.transcript)
                .unwrap_or_default();

            // Empty interim results arrive for silence
            if transcript.is_empty() && !results.speech_final {
                return None;
            }
            Some(TranscriptEvent::new(
                transcript,
                results.is_final,
                results.speech_final,
            ))
        }
        DeepgramMessage::UtteranceEnd => Some(TranscriptEvent::new("", true, true)),
        DeepgramMessage::Metadata | DeepgramMessage::SpeechStarted => None,
        DeepgramMessage::Unknown => {
            debug!("Ignoring Deepgram message: {}", text);
            None
        }
    }
}

pub struct DeepgramSTT {
    config: STTConfig,
    audio_tx: Option<mpsc::Sender<Bytes>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    events_rx: Option<mpsc::Receiver<TranscriptEvent>>,
    connection_handle: Option<JoinHandle<()>>,
    is_connected: Arc<AtomicBool>,
}

impl DeepgramSTT {
    pub fn new(config: STTConfig) -> STTResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(STTError::ConfigurationError(
                "Deepgram API key is required".to_string(),
            ));
        }
        if config.sample_rate == 0 {
            return Err(STTError::ConfigurationError(
                "Sample rate must be positive".to_string(),
            ));
        }

        Ok(Self {
            config,
            audio_tx: None,
            shutdown_tx: None,
            events_rx: None,
            connection_handle: None,
            is_connected: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn build_websocket_url(&self) -> STTResult<Url> {
        let base = self.config.endpoint.as_deref().unwrap_or(DEEPGRAM_STT_URL);
        let mut url = Url::parse(base)
            .map_err(|e| STTError::ConfigurationError(format!("Invalid endpoint {base}: {e}")))?;

        url.query_pairs_mut()
            .append_pair("model", &self.config.model)
            .append_pair("language", &self.config.language)
            .append_pair("encoding", "linear16")
            .append_pair("sample_rate", &self.config.sample_rate.to_string())
            .append_pair("channels", "1")
            .append_pair("interim_results", "true")
            .append_pair("punctuate", "true")
            .append_pair("smart_format", "true")
            .append_pair("endpointing", &ENDPOINTING_MS.to_string())
            .append_pair("utterance_end_ms", &UTTERANCE_END_MS.to_string());

        Ok(url)
    }
}

#[async_trait]
impl TranscriptionSource for DeepgramSTT {
    async fn connect(&mut self) -> STTResult<()> {
        if self.is_ready() {
            return Ok(());
        }

        let url = self.build_websocket_url()?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| STTError::ConnectionFailed(format!("Invalid request: {e}")))?;
        let auth = HeaderValue::from_str(&format!("Token {}", self.config.api_key))
            .map_err(|e| STTError::ConfigurationError(format!("Invalid API key: {e}")))?;
        request.headers_mut().insert("Authorization", auth);

        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let (ws_stream, _response) = timeout(connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                STTError::ConnectionFailed(format!(
                    "Timed out connecting to Deepgram after {}ms",
                    connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| STTError::ConnectionFailed(format!("Failed to connect to Deepgram: {e}")))?;

        info!("Connected to Deepgram STT WebSocket");

        let (audio_tx, mut audio_rx) = mpsc::channel::<Bytes>(32);
        let (events_tx, events_rx) = mpsc::channel::<TranscriptEvent>(256);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let is_connected = self.is_connected.clone();
        is_connected.store(true, Ordering::Release);

        let connection_handle = tokio::spawn(async move {
            let (mut ws_sink, mut ws_stream) = ws_stream.split();
            let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
            keepalive.tick().await;

            loop {
                tokio::select! {
                    Some(audio) = audio_rx.recv() => {
                        if let Err(e) = ws_sink.send(Message::Binary(audio)).await {
                            error!("Failed to send audio to Deepgram: {}", e);
                            break;
                        }
                    }

                    _ = keepalive.tick() => {
                        let ping = r#"{"type":"KeepAlive"}"#;
                        if let Err(e) = ws_sink.send(Message::Text(ping.to_string().into())).await {
                            warn!("Failed to send Deepgram keepalive: {}", e);
                            break;
                        }
                    }

                    message = ws_stream.next() => match message {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(event) = parse_message(text.as_str())
                                && events_tx.send(event).await.is_err()
                            {
                                debug!("Transcript receiver dropped");
                                break;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!("Deepgram WebSocket closed: {:?}", frame);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!("Deepgram WebSocket error: {}", e);
                            break;
                        }
                        None => {
                            info!("Deepgram WebSocket stream ended");
                            break;
                        }
                    },

                    _ = &mut shutdown_rx => {
                        let close = r#"{"type":"CloseStream"}"#;
                        let _ = ws_sink.send(Message::Text(close.to_string().into())).await;
                        let _ = ws_sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            is_connected.store(false, Ordering::Release);
            info!("Deepgram STT connection closed");
        });

        self.audio_tx = Some(audio_tx);
        self.shutdown_tx = Some(shutdown_tx);
        self.events_rx = Some(events_rx);
        self.connection_handle = Some(connection_handle);
        Ok(())
    }

    async fn send_audio(&mut self, audio: Bytes) -> STTResult<()> {
        if !self.is_ready() {
            return Err(STTError::NotConnected);
        }
        let sender = self.audio_tx.as_ref().ok_or(STTError::NotConnected)?;
        sender
            .send(audio)
            .await
            .map_err(|_| STTError::NetworkError("Deepgram connection task stopped".to_string()))
    }

    async fn disconnect(&mut self) -> STTResult<()> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        self.audio_tx = None;

        if let Some(handle) = self.connection_handle.take() {
            let _ = timeout(Duration::from_secs(2), handle).await;
        }
        self.is_connected.store(false, Ordering::Release);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.is_connected.load(Ordering::Acquire)
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<TranscriptEvent>> {
        self.events_rx.take()
    }

    fn provider_name(&self) -> &'static str {
        "deepgram"
    }
}

impl Drop for DeepgramSTT {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn keyed(endpoint: Option<String>) -> STTConfig {
        STTConfig {
            api_key: "dg_key".to_string(),
            endpoint,
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_key_rejected() {
        assert!(matches!(
            DeepgramSTT::new(STTConfig::default()),
            Err(STTError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_websocket_url() {
        let stt = DeepgramSTT::new(keyed(None)).unwrap();
        let url = stt.build_websocket_url().unwrap();
        let query = url.query().unwrap();

        assert!(url.as_str().starts_with(DEEPGRAM_STT_URL));
        assert!(query.contains("model=nova-2"));
        assert!(query.contains("language=en-US"));
        assert!(query.contains("encoding=linear16"));
        assert!(query.contains("sample_rate=16000"));
        assert!(query.contains("interim_results=true"));
    }

    #[test]
    fn test_parse_final_result() {
        let text = r#"{"type":"Results","channel":{"alternatives":[{"transcript":"hello there","confidence":0.98}]},"is_final":true,"speech_final":true}"#;
        assert_eq!(
            parse_message(text),
            Some(TranscriptEvent::new("hello there", true, true))
        );
    }

    #[test]
    fn test_parse_interim_result() {
        let text = r#"{"type":"Results","channel":{"alternatives":[{"transcript":"hel"}]},"is_final":false,"speech_final":false}"#;
        assert_eq!(
            parse_message(text),
            Some(TranscriptEvent::new("hel", false, false))
        );
    }

    #[test]
    fn test_parse_silence_and_metadata() {
        let silence = r#"{"type":"Results","channel":{"alternatives":[{"transcript":""}]},"is_final":false}"#;
        assert_eq!(parse_message(silence), None);
        assert_eq!(parse_message(r#"{"type":"Metadata","request_id":"abc"}"#), None);
        assert_eq!(parse_message(r#"{"type":"SpeechStarted","timestamp":1.0}"#), None);
        assert_eq!(parse_message(r#"{"type":"Whatever"}"#), None);
        assert_eq!(parse_message("garbage"), None);
    }

    #[test]
    fn test_parse_utterance_end() {
        let text = r#"{"type":"UtteranceEnd","channel":[0,1],"last_word_end":2.5}"#;
        assert_eq!(parse_message(text), Some(TranscriptEvent::new("", true, true)));
    }

    #[tokio::test]
    async fn test_send_audio_requires_connection() {
        let mut stt = DeepgramSTT::new(keyed(None)).unwrap();
        assert!(!stt.is_ready());
        assert!(matches!(
            stt.send_audio(Bytes::from_static(&[0, 0])).await,
            Err(STTError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_connect_timeout_enforced() {
        // Accepts TCP but never completes the websocket handshake
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let mut config = keyed(Some(format!("ws://{addr}/v1/listen")));
        config.connect_timeout_ms = 200;
        let mut stt = DeepgramSTT::new(config).unwrap();

        match stt.connect().await {
            Err(STTError::ConnectionFailed(msg)) => assert!(msg.contains("Timed out")),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(!stt.is_ready());
    }

    #[tokio::test]
    async fn test_round_trip_against_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            // Wait for the first audio frame before answering
            loop {
                match ws.next().await {
                    Some(Ok(Message::Binary(data))) => {
                        assert_eq!(data.as_ref(), &[1u8, 2, 3, 4]);
                        break;
                    }
                    Some(Ok(_)) => continue,
                    other => panic!("unexpected frame: {other:?}"),
                }
            }
            let result = r#"{"type":"Results","channel":{"alternatives":[{"transcript":"hi"}]},"is_final":true,"speech_final":true}"#;
            ws.send(Message::Text(result.to_string().into())).await.unwrap();
            // Drain until the client closes
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
            }
        });

        let mut stt = DeepgramSTT::new(keyed(Some(format!("ws://{addr}/v1/listen")))).unwrap();
        stt.connect().await.unwrap();
        assert!(stt.is_ready());

        let mut events = stt.take_events().unwrap();
        assert!(stt.take_events().is_none());

        stt.send_audio(Bytes::from_static(&[1, 2, 3, 4])).await.unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event, TranscriptEvent::new("hi", true, true));

        stt.disconnect().await.unwrap();
        assert!(!stt.is_ready());
        server.await.unwrap();
    }
}
