//! Ordered, concurrency-bounded synthesis of a turn's sentences.
//!
//! Sentences are admitted in FIFO order and each one starts synthesizing as
//! soon as one of the K slots frees up, so a later sentence may start (and
//! finish) before an earlier one. Results are parked in an arena indexed by
//! admission position and released through an emission cursor: the sink sees
//! exactly one result per sentence, in strictly increasing sequence order.
//!
//! ```text
//!  submit() ──▶ commands ──▶ ┌────────────┐ ──spawn──▶ synthesize() x K
//!  finish()                  │   driver   │ ◀─results──┘
//!  cancel() ──▶ token ─────▶ │ queue/arena│ ──in order──▶ TurnEventSink
//!                            └────────────┘
//! ```
//!
//! The driver is a single task; `submit` never waits on synthesis latency.

use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::sentence::Sentence;
use crate::core::sink::TurnEventSink;
use crate::core::tts::{AudioData, SynthesisClient};

/// Result of synthesizing one sentence.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisOutcome {
    Audio(AudioData),
    Failed { reason: String },
}

impl SynthesisOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// How a dispatcher run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Every admitted sentence was emitted; `failed` of them as failures.
    Completed { emitted: usize, failed: usize },
    Cancelled,
}

/// Shared pool of synthesis slots.
///
/// One pool per dispatcher gives a per-session ceiling; handing the same pool
/// to every dispatcher makes K a process-wide budget.
pub fn synthesis_slots(concurrency: usize) -> Arc<Semaphore> {
    Arc::new(Semaphore::new(concurrency.max(1)))
}

/// Slot request kept alive across driver iterations so it keeps its place
/// in the semaphore's FIFO queue.
type PendingPermit =
    Pin<Box<dyn Future<Output = Result<OwnedSemaphorePermit, AcquireError>> + Send>>;

async fn next_permit(
    pending: &mut Option<PendingPermit>,
) -> Result<OwnedSemaphorePermit, AcquireError> {
    match pending.as_mut() {
        Some(acquire) => acquire.await,
        None => std::future::pending().await,
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("synthesis panicked: {detail}")
}

enum Command {
    Submit(Sentence),
    Finish,
}

enum JobState {
    Queued,
    InFlight,
    Done(SynthesisOutcome),
    Emitted,
}

struct SynthesisJob {
    sentence: Sentence,
    state: JobState,
}

/// Handle to one turn's dispatcher.
///
/// Dropping the handle without awaiting [`wait`](Self::wait) cancels the run.
pub struct SynthesisDispatcher {
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    driver: Option<JoinHandle<DispatchOutcome>>,
}

impl SynthesisDispatcher {
    /// Start a dispatcher drawing slots from `slots`.
    pub fn spawn(
        turn_id: u64,
        client: Arc<dyn SynthesisClient>,
        slots: Arc<Semaphore>,
        sink: Arc<dyn TurnEventSink>,
        cancel: CancellationToken,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let driver = Driver {
            turn_id,
            client,
            slots,
            sink,
            cancel: cancel.clone(),
            commands: command_rx,
        };

        Self {
            commands,
            cancel,
            driver: Some(tokio::spawn(driver.run())),
        }
    }

    /// Start a dispatcher with its own pool of `concurrency` slots.
    pub fn with_concurrency(
        turn_id: u64,
        client: Arc<dyn SynthesisClient>,
        concurrency: usize,
        sink: Arc<dyn TurnEventSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self::spawn(turn_id, client, synthesis_slots(concurrency), sink, cancel)
    }

    /// Enqueue a sentence. Never blocks.
    pub fn submit(&self, sentence: Sentence) {
        if self.commands.send(Command::Submit(sentence)).is_err() {
            debug!("Dispatcher already stopped; sentence dropped");
        }
    }

    /// No more sentences will be submitted.
    pub fn finish(&self) {
        let _ = self.commands.send(Command::Finish);
    }

    /// Stop immediately: queued sentences are dropped and results of
    /// in-flight calls are discarded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until everything admitted has been emitted, or the run is
    /// cancelled.
    pub async fn wait(mut self) -> DispatchOutcome {
        let Some(driver) = self.driver.take() else {
            return DispatchOutcome::Cancelled;
        };
        match driver.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Synthesis dispatcher task failed: {}", e);
                DispatchOutcome::Cancelled
            }
        }
    }
}

impl Drop for SynthesisDispatcher {
    fn drop(&mut self) {
        if self.driver.is_some() {
            self.cancel.cancel();
        }
    }
}

struct Driver {
    turn_id: u64,
    client: Arc<dyn SynthesisClient>,
    slots: Arc<Semaphore>,
    sink: Arc<dyn TurnEventSink>,
    cancel: CancellationToken,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl Driver {
    async fn run(mut self) -> DispatchOutcome {
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<(usize, SynthesisOutcome)>();

        let mut arena: Vec<SynthesisJob> = Vec::new();
        let mut queue: VecDeque<usize> = VecDeque::new();
        let mut cursor = 0usize;
        let mut in_flight = 0usize;
        let mut finished = false;
        let mut failed = 0usize;
        let mut acquire: Option<PendingPermit> = None;

        loop {
            if finished && cursor == arena.len() {
                debug!(turn_id = self.turn_id, emitted = cursor, "Dispatcher drained");
                return DispatchOutcome::Completed {
                    emitted: cursor,
                    failed,
                };
            }

            if acquire.is_none() && !queue.is_empty() {
                acquire = Some(Box::pin(self.slots.clone().acquire_owned()));
            }

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    info!(
                        turn_id = self.turn_id,
                        in_flight,
                        dropped = queue.len(),
                        "Dispatcher cancelled"
                    );
                    return DispatchOutcome::Cancelled;
                }

                Some((index, outcome)) = result_rx.recv(), if in_flight > 0 => {
                    in_flight -= 1;
                    if let Some(job) = arena.get_mut(index) {
                        job.state = JobState::Done(outcome);
                    }

                    // Release every result the cursor has reached
                    while let Some(job) = arena.get_mut(cursor) {
                        if self.cancel.is_cancelled() {
                            return DispatchOutcome::Cancelled;
                        }
                        if !matches!(job.state, JobState::Done(_)) {
                            break;
                        }
                        let JobState::Done(outcome) = std::mem::replace(&mut job.state, JobState::Emitted) else {
                            break;
                        };
                        if let SynthesisOutcome::Failed { reason } = &outcome {
                            failed += 1;
                            warn!(
                                turn_id = self.turn_id,
                                seq = job.sentence.seq,
                                "Synthesis failed: {}",
                                reason
                            );
                        }
                        let delivered = tokio::select! {
                            biased;
                            _ = self.cancel.cancelled() => false,
                            _ = self.sink.on_sentence_audio(self.turn_id, &job.sentence, &outcome) => true,
                        };
                        if !delivered {
                            info!(
                                turn_id = self.turn_id,
                                seq = job.sentence.seq,
                                "Dispatcher cancelled during emission"
                            );
                            return DispatchOutcome::Cancelled;
                        }
                        cursor += 1;
                    }
                }

                permit = next_permit(&mut acquire), if acquire.is_some() => {
                    acquire = None;
                    let Ok(permit) = permit else {
                        error!(turn_id = self.turn_id, "Synthesis slot pool closed");
                        return DispatchOutcome::Cancelled;
                    };
                    let Some(index) = queue.pop_front() else {
                        continue;
                    };
                    let job = &mut arena[index];
                    job.state = JobState::InFlight;
                    in_flight += 1;

                    let client = self.client.clone();
                    let text = job.sentence.text.clone();
                    let result_tx = result_tx.clone();
                    debug!(turn_id = self.turn_id, seq = job.sentence.seq, "Synthesis started");

                    tokio::spawn(async move {
                        let call = AssertUnwindSafe(client.synthesize(&text)).catch_unwind();
                        let outcome = match call.await {
                            Ok(Ok(audio)) => SynthesisOutcome::Audio(audio),
                            Ok(Err(e)) => SynthesisOutcome::Failed { reason: e.to_string() },
                            Err(payload) => SynthesisOutcome::Failed {
                                reason: panic_reason(payload.as_ref()),
                            },
                        };
                        drop(permit);
                        // Fails once the driver is gone; the result is discarded
                        let _ = result_tx.send((index, outcome));
                    });
                }

                command = self.commands.recv(), if !finished => match command {
                    Some(Command::Submit(sentence)) => {
                        if let Some(last) = arena.last() {
                            debug_assert!(sentence.seq > last.sentence.seq);
                        }
                        queue.push_back(arena.len());
                        arena.push(SynthesisJob {
                            sentence,
                            state: JobState::Queued,
                        });
                    }
                    Some(Command::Finish) | None => finished = true,
                },
            }
        }
    }
}
