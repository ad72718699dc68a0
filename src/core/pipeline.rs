//! One turn: token stream → sentences → ordered synthesis → sink.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::dispatcher::{DispatchOutcome, SynthesisDispatcher};
use crate::core::llm::{ChatMessage, TokenSource};
use crate::core::sentence::{Sentence, SentenceDetector, SentencePolicy};
use crate::core::sink::TurnEventSink;
use crate::core::tts::SynthesisClient;

/// How long a cancelled turn waits for the sink to take its completion event.
const CANCELLED_NOTIFY_TIMEOUT: Duration = Duration::from_millis(500);

/// Run a sink call unless `cancel` fires first. Returns false when cancelled.
async fn deliver(cancel: &CancellationToken, call: impl Future<Output = ()>) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = call => true,
    }
}

/// Hand the final event to the sink.
///
/// A cancelled turn gets a bounded window to deliver its completion; any
/// other turn stops waiting as soon as `cancel` fires.
async fn notify_complete(
    sink: &dyn TurnEventSink,
    outcome: &TurnOutcome,
    cancel: &CancellationToken,
) {
    let delivered = match outcome.status {
        TurnStatus::Cancelled => {
            tokio::time::timeout(CANCELLED_NOTIFY_TIMEOUT, sink.on_turn_complete(outcome))
                .await
                .is_ok()
        }
        _ => deliver(cancel, sink.on_turn_complete(outcome)).await,
    };
    if !delivered {
        warn!(
            turn_id = outcome.turn_id,
            status = %outcome.status,
            "Turn completion not delivered"
        );
    }
}

/// Lifecycle of a turn.
///
/// `Idle → Streaming → Finalizing → Completed | Cancelled | Failed`;
/// cancellation is accepted from `Streaming` and `Finalizing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Streaming,
    Finalizing,
    Completed,
    Cancelled,
    Failed,
}

impl TurnState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Completed,
    Cancelled,
    Failed,
}

impl TurnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final report for a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub turn_id: u64,
    pub input: String,
    /// Concatenation of every fragment received, including any remainder
    pub output: String,
    pub status: TurnStatus,
    /// Sentences admitted for synthesis
    pub sentences: usize,
    pub failed_sentences: usize,
    pub error: Option<String>,
}

impl TurnOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == TurnStatus::Completed
    }
}

/// Collaborators shared by every turn of a session.
#[derive(Clone)]
pub struct TurnResources {
    pub token_source: Arc<dyn TokenSource>,
    pub synthesizer: Arc<dyn SynthesisClient>,
    /// Synthesis slot pool; per session or process-wide
    pub slots: Arc<Semaphore>,
    pub sink: Arc<dyn TurnEventSink>,
    pub policy: SentencePolicy,
}

pub struct TurnPipeline {
    turn_id: u64,
    input: String,
    resources: TurnResources,
    state: watch::Sender<TurnState>,
}

impl TurnPipeline {
    pub fn new(turn_id: u64, input: impl Into<String>, resources: TurnResources) -> Self {
        let (state, _) = watch::channel(TurnState::Idle);
        Self {
            turn_id,
            input: input.into(),
            resources,
            state,
        }
    }

    pub fn turn_id(&self) -> u64 {
        self.turn_id
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<TurnState> {
        self.state.subscribe()
    }

    fn transition(&self, next: TurnState) {
        debug!(turn_id = self.turn_id, state = ?next, "Turn state");
        self.state.send_replace(next);
    }

    /// Drive the turn to a terminal state.
    ///
    /// `messages` is the full prompt (history plus this turn's user entry).
    /// Cancelling `cancel` stops the token stream and the dispatcher; the
    /// sink still receives a `cancelled` completion.
    pub async fn run(self, messages: Vec<ChatMessage>, cancel: CancellationToken) -> TurnOutcome {
        let turn_id = self.turn_id;
        let sink = self.resources.sink.clone();
        info!(turn_id, "Turn started");
        self.transition(TurnState::Streaming);

        let dispatcher = SynthesisDispatcher::spawn(
            turn_id,
            self.resources.synthesizer.clone(),
            self.resources.slots.clone(),
            sink.clone(),
            cancel.child_token(),
        );
        let stop = cancel.child_token();
        let mut detector = SentenceDetector::with_policy(self.resources.policy.clone());
        let mut output = String::new();
        let mut next_seq = 0u64;
        let mut error: Option<String> = None;

        let stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.resources.token_source.stream(messages, stop.clone()) => Some(result),
        };
        let Some(stream) = stream else {
            return self.finish_cancelled(dispatcher, output, next_seq, &cancel).await;
        };

        match stream {
            Ok(mut stream) => loop {
                let item = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    item = stream.next() => Some(item),
                };
                let Some(item) = item else {
                    stop.cancel();
                    return self.finish_cancelled(dispatcher, output, next_seq, &cancel).await;
                };

                match item {
                    Some(Ok(fragment)) => {
                        output.push_str(&fragment);
                        for text in detector.add_chunk(&fragment) {
                            let sentence = Sentence::new(next_seq, text);
                            if !deliver(&cancel, sink.on_sentence_text(turn_id, &sentence)).await {
                                stop.cancel();
                                return self
                                    .finish_cancelled(dispatcher, output, next_seq, &cancel)
                                    .await;
                            }
                            dispatcher.submit(sentence);
                            next_seq += 1;
                        }
                    }
                    Some(Err(e)) => {
                        error!(turn_id, "Token stream failed: {}", e);
                        error = Some(e.to_string());
                        break;
                    }
                    None => break,
                }
            },
            Err(e) => {
                error!(turn_id, "Token stream could not start: {}", e);
                error = Some(e.to_string());
            }
        }

        self.transition(TurnState::Finalizing);

        // A failed stream keeps what was already detected but adds nothing
        let remainder = detector.get_remainder();
        let remainder = remainder.trim();
        if error.is_none() && !remainder.is_empty() {
            let sentence = Sentence::new(next_seq, remainder);
            if !deliver(&cancel, sink.on_sentence_text(turn_id, &sentence)).await {
                return self.finish_cancelled(dispatcher, output, next_seq, &cancel).await;
            }
            dispatcher.submit(sentence);
            next_seq += 1;
        }
        dispatcher.finish();

        let dispatched = tokio::select! {
            biased;
            _ = cancel.cancelled() => DispatchOutcome::Cancelled,
            outcome = dispatcher.wait() => outcome,
        };

        let (status, failed_sentences) = match (dispatched, &error) {
            (DispatchOutcome::Cancelled, _) => (TurnStatus::Cancelled, 0),
            (DispatchOutcome::Completed { failed, .. }, Some(_)) => (TurnStatus::Failed, failed),
            (DispatchOutcome::Completed { failed, .. }, None) => (TurnStatus::Completed, failed),
        };

        self.transition(match status {
            TurnStatus::Completed => TurnState::Completed,
            TurnStatus::Cancelled => TurnState::Cancelled,
            TurnStatus::Failed => TurnState::Failed,
        });

        let outcome = TurnOutcome {
            turn_id,
            input: self.input,
            output,
            status,
            sentences: next_seq as usize,
            failed_sentences,
            error,
        };
        info!(
            turn_id,
            status = %outcome.status,
            sentences = outcome.sentences,
            failed = outcome.failed_sentences,
            "Turn finished"
        );
        notify_complete(sink.as_ref(), &outcome, &cancel).await;
        outcome
    }

    async fn finish_cancelled(
        self,
        dispatcher: SynthesisDispatcher,
        output: String,
        sentences: u64,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        dispatcher.cancel();
        self.transition(TurnState::Cancelled);
        info!(turn_id = self.turn_id, sentences, "Turn cancelled");

        let outcome = TurnOutcome {
            turn_id: self.turn_id,
            input: self.input,
            output,
            status: TurnStatus::Cancelled,
            sentences: sentences as usize,
            failed_sentences: 0,
            error: None,
        };
        notify_complete(self.resources.sink.as_ref(), &outcome, cancel).await;
        outcome
    }
}
