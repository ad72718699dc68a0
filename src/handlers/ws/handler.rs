//! Voice agent WebSocket handler
//!
//! One connection owns one [`Session`]. Typed utterances and finished speech
//! utterances start turns; the session's sink streams sentence text and
//! ordered sentence audio back over the same socket.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::{select, time::Duration};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::core::session::Session;
use crate::core::stt::{
    STTError, STTResult, TranscriptEvent, TranscriptionSource, UtteranceAssembler,
    create_transcription_source,
};
use crate::state::AppState;

use super::messages::{IncomingMessage, MessageRoute, OutgoingMessage};
use super::sink::WsSink;

/// Outgoing message buffer; bounded so a slow client backpressures the turn
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// How long teardown waits for queued messages to flush
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Voice agent WebSocket handler
///
/// Upgrades the HTTP connection and runs one conversation session on it.
pub async fn ws_agent_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    debug!("Agent WebSocket connection upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_agent_socket(socket, state))
}

/// Live transcription for this connection, created on the first audio frame.
enum SpeechInput {
    Idle,
    Active {
        source: Box<dyn TranscriptionSource>,
        events: mpsc::Receiver<TranscriptEvent>,
        assembler: UtteranceAssembler,
    },
    /// Connecting failed; further audio is dropped
    Unavailable,
}

enum Flow {
    Continue,
    Close,
}

async fn handle_agent_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let session_id = uuid::Uuid::new_v4().to_string();
    info!(session_id = %session_id, "Agent WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();
    let (message_tx, mut message_rx) = mpsc::channel::<MessageRoute>(CHANNEL_BUFFER_SIZE);

    // Sender task for outgoing messages
    let sender_task = tokio::spawn(async move {
        while let Some(route) = message_rx.recv().await {
            let result = match route {
                MessageRoute::Outgoing(message) => match serde_json::to_string(&message) {
                    Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing message: {}", e);
                        continue;
                    }
                },
                MessageRoute::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };

            if let Err(e) = result {
                debug!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    let sink = Arc::new(WsSink::new(message_tx.clone()));
    let mut session = match Session::from_config(
        session_id.clone(),
        &app_state.config,
        sink,
        app_state.synthesis_slots.clone(),
    ) {
        Ok(session) => session,
        Err(e) => {
            error!(session_id = %session_id, "Session construction failed: {}", e);
            send(
                &message_tx,
                OutgoingMessage::error("session_init_failed", e.to_string()),
            )
            .await;
            close_writer(&message_tx, sender_task).await;
            return;
        }
    };

    let handle = session.handle();
    let shutdown = handle.shutdown_token();
    app_state.registry.register(handle);
    info!(
        session_id = %session_id,
        active_sessions = app_state.registry.len(),
        "Session created"
    );

    send(
        &message_tx,
        OutgoingMessage::Ready {
            session_id: session_id.clone(),
        },
    )
    .await;

    let mut speech = SpeechInput::Idle;

    loop {
        select! {
            _ = shutdown.cancelled() => {
                info!(session_id = %session_id, "Session reclaimed after inactivity");
                send(
                    &message_tx,
                    OutgoingMessage::error("idle_timeout", "Session closed due to inactivity"),
                )
                .await;
                break;
            }
            outcome = session.turn_finished() => {
                debug!(
                    session_id = %session_id,
                    turn_id = outcome.turn_id,
                    status = %outcome.status,
                    "Turn settled"
                );
            }
            event = next_transcript(&mut speech) => {
                match event {
                    Some(event) => {
                        handle_transcript(event, &mut speech, &mut session, &message_tx).await;
                    }
                    None => {
                        warn!(session_id = %session_id, "Transcription stream ended");
                        disconnect_speech(&mut speech).await;
                    }
                }
            }
            msg_result = receiver.next() => {
                session.touch();

                match msg_result {
                    Some(Ok(msg)) => {
                        let flow = process_message(
                            msg,
                            &mut session,
                            &mut speech,
                            &message_tx,
                            &app_state.config,
                        )
                        .await;

                        if let Flow::Close = flow {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(session_id = %session_id, "Agent WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!(session_id = %session_id, "Agent WebSocket closed by client");
                        break;
                    }
                }
            }
        }
    }

    // Cleanup
    app_state.registry.remove(&session_id);
    session.teardown().await;
    disconnect_speech(&mut speech).await;
    close_writer(&message_tx, sender_task).await;

    info!(
        session_id = %session_id,
        active_sessions = app_state.registry.len(),
        "Agent WebSocket connection terminated"
    );
}

async fn process_message(
    msg: Message,
    session: &mut Session,
    speech: &mut SpeechInput,
    message_tx: &mpsc::Sender<MessageRoute>,
    config: &ServerConfig,
) -> Flow {
    match msg {
        Message::Text(text) => {
            let incoming: IncomingMessage = match serde_json::from_str(&text) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!("Failed to parse agent message: {}", e);
                    send(
                        message_tx,
                        OutgoingMessage::error("parse_error", format!("Invalid message format: {e}")),
                    )
                    .await;
                    return Flow::Continue;
                }
            };

            if let Err(e) = incoming.validate_size() {
                send(message_tx, OutgoingMessage::error("validation_error", e)).await;
                return Flow::Continue;
            }

            match incoming {
                IncomingMessage::UserText { text } => {
                    start_turn(session, &text, message_tx).await;
                    Flow::Continue
                }
                IncomingMessage::Cancel => {
                    if let Some(outcome) = session.cancel_turn().await {
                        info!(
                            session_id = %session.id(),
                            turn_id = outcome.turn_id,
                            "Turn cancelled by client"
                        );
                    }
                    Flow::Continue
                }
                IncomingMessage::EndCall => {
                    info!(session_id = %session.id(), "Client ended the call");
                    Flow::Close
                }
            }
        }
        Message::Binary(data) => {
            if matches!(speech, SpeechInput::Idle) {
                *speech = match connect_speech(config).await {
                    Ok(active) => active,
                    Err(e) => {
                        warn!(session_id = %session.id(), "Transcription unavailable: {}", e);
                        send(message_tx, OutgoingMessage::error("stt_unavailable", e.to_string()))
                            .await;
                        SpeechInput::Unavailable
                    }
                };
            }

            if let SpeechInput::Active { source, .. } = speech
                && let Err(e) = source.send_audio(data).await
            {
                warn!(session_id = %session.id(), "Failed to forward audio: {}", e);
                send(message_tx, OutgoingMessage::error("stt_error", e.to_string())).await;
                disconnect_speech(speech).await;
            }
            Flow::Continue
        }
        Message::Close(_) => Flow::Close,
        Message::Ping(_) | Message::Pong(_) => Flow::Continue,
    }
}

async fn start_turn(session: &mut Session, text: &str, message_tx: &mpsc::Sender<MessageRoute>) {
    match session.start_turn(text).await {
        Ok(turn_id) => debug!(session_id = %session.id(), turn_id, "Turn started"),
        Err(e) => {
            warn!(session_id = %session.id(), "Turn rejected: {}", e);
            send(message_tx, OutgoingMessage::error("turn_rejected", e.to_string())).await;
        }
    }
}

async fn handle_transcript(
    event: TranscriptEvent,
    speech: &mut SpeechInput,
    session: &mut Session,
    message_tx: &mpsc::Sender<MessageRoute>,
) {
    if !event.text.trim().is_empty() {
        send(
            message_tx,
            OutgoingMessage::Transcript {
                text: event.text.clone(),
                is_final: event.is_final,
            },
        )
        .await;
    }

    let utterance = match speech {
        SpeechInput::Active { assembler, .. } => assembler.push(&event),
        _ => None,
    };
    if let Some(utterance) = utterance {
        session.touch();
        start_turn(session, &utterance, message_tx).await;
    }
}

/// Next transcript event; pending forever while no source is connected.
async fn next_transcript(speech: &mut SpeechInput) -> Option<TranscriptEvent> {
    match speech {
        SpeechInput::Active { events, .. } => events.recv().await,
        _ => std::future::pending().await,
    }
}

async fn connect_speech(config: &ServerConfig) -> STTResult<SpeechInput> {
    let mut source = create_transcription_source(&config.stt_provider, config.stt_config())?;
    source.connect().await?;
    let events = source
        .take_events()
        .ok_or_else(|| STTError::ConnectionFailed("transcript channel unavailable".to_string()))?;

    Ok(SpeechInput::Active {
        source,
        events,
        assembler: UtteranceAssembler::new(),
    })
}

async fn disconnect_speech(speech: &mut SpeechInput) {
    if let SpeechInput::Active { mut source, .. } =
        std::mem::replace(speech, SpeechInput::Unavailable)
        && let Err(e) = source.disconnect().await
    {
        error!("Failed to disconnect transcription source: {}", e);
    }
}

async fn send(message_tx: &mpsc::Sender<MessageRoute>, message: OutgoingMessage) {
    let _ = message_tx.send(MessageRoute::Outgoing(message)).await;
}

/// Queue a close frame and give the writer a bounded time to flush.
async fn close_writer(message_tx: &mpsc::Sender<MessageRoute>, mut sender_task: JoinHandle<()>) {
    let _ = tokio::time::timeout(WRITER_DRAIN_TIMEOUT, message_tx.send(MessageRoute::Close)).await;
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut sender_task)
        .await
        .is_err()
    {
        sender_task.abort();
    }
}
