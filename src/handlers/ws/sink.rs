//! Adapter from turn events to WebSocket JSON messages.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::dispatcher::SynthesisOutcome;
use crate::core::pipeline::TurnOutcome;
use crate::core::sentence::Sentence;
use crate::core::sink::TurnEventSink;

use super::messages::{MessageRoute, OutgoingMessage};

/// Forwards turn events to the socket writer task.
///
/// The channel is bounded, so a slow client applies backpressure to the
/// dispatcher rather than growing memory.
#[derive(Debug, Clone)]
pub struct WsSink {
    tx: mpsc::Sender<MessageRoute>,
}

impl WsSink {
    pub fn new(tx: mpsc::Sender<MessageRoute>) -> Self {
        Self { tx }
    }

    async fn send(&self, message: OutgoingMessage) {
        if self.tx.send(MessageRoute::Outgoing(message)).await.is_err() {
            debug!("WebSocket writer gone, dropping turn event");
        }
    }
}

pub(crate) fn audio_message(
    turn_id: u64,
    sentence: &Sentence,
    outcome: &SynthesisOutcome,
) -> OutgoingMessage {
    match outcome {
        SynthesisOutcome::Audio(audio) => OutgoingMessage::Audio {
            turn_id,
            seq: sentence.seq,
            format: audio.format.clone(),
            sample_rate: audio.sample_rate,
            data: BASE64.encode(&audio.data),
        },
        SynthesisOutcome::Failed { reason } => OutgoingMessage::AudioFailed {
            turn_id,
            seq: sentence.seq,
            reason: reason.clone(),
        },
    }
}

#[async_trait]
impl TurnEventSink for WsSink {
    async fn on_sentence_text(&self, turn_id: u64, sentence: &Sentence) {
        self.send(OutgoingMessage::Sentence {
            turn_id,
            seq: sentence.seq,
            text: sentence.text.clone(),
        })
        .await;
    }

    async fn on_sentence_audio(&self, turn_id: u64, sentence: &Sentence, outcome: &SynthesisOutcome) {
        self.send(audio_message(turn_id, sentence, outcome)).await;
    }

    async fn on_turn_complete(&self, outcome: &TurnOutcome) {
        self.send(OutgoingMessage::TurnComplete {
            turn_id: outcome.turn_id,
            text: outcome.output.clone(),
            status: outcome.status,
            error: outcome.error.clone(),
        })
        .await;
    }
}
