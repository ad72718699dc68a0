//! Emission sink: where a turn's text and audio events go.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::dispatcher::SynthesisOutcome;
use crate::core::pipeline::TurnOutcome;
use crate::core::sentence::Sentence;

/// Receives a turn's events.
///
/// Calls for one turn never overlap: sentence text arrives in detector order,
/// sentence audio in strictly increasing `seq` order (exactly once per
/// admitted sentence), and `on_turn_complete` last.
#[async_trait]
pub trait TurnEventSink: Send + Sync {
    async fn on_sentence_text(&self, turn_id: u64, sentence: &Sentence);

    async fn on_sentence_audio(&self, turn_id: u64, sentence: &Sentence, outcome: &SynthesisOutcome);

    async fn on_turn_complete(&self, outcome: &TurnOutcome);
}

/// Owned copy of a sink call.
#[derive(Debug, Clone)]
pub enum SinkEvent {
    SentenceText {
        turn_id: u64,
        sentence: Sentence,
    },
    SentenceAudio {
        turn_id: u64,
        sentence: Sentence,
        outcome: SynthesisOutcome,
    },
    TurnComplete(TurnOutcome),
}

/// Forwards every call into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl TurnEventSink for ChannelSink {
    async fn on_sentence_text(&self, turn_id: u64, sentence: &Sentence) {
        let _ = self.tx.send(SinkEvent::SentenceText {
            turn_id,
            sentence: sentence.clone(),
        });
    }

    async fn on_sentence_audio(&self, turn_id: u64, sentence: &Sentence, outcome: &SynthesisOutcome) {
        let _ = self.tx.send(SinkEvent::SentenceAudio {
            turn_id,
            sentence: sentence.clone(),
            outcome: outcome.clone(),
        });
    }

    async fn on_turn_complete(&self, outcome: &TurnOutcome) {
        let _ = self.tx.send(SinkEvent::TurnComplete(outcome.clone()));
    }
}
