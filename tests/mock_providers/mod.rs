//! Deterministic mock collaborators for integration tests
//!
//! - Scripted token sources (one script per turn, fixed fragment gap)
//! - Synthesis clients with per-sentence latency, failure and panic injection
//! - A sink that stalls on one kind of event
//! - Helpers to pull sink events apart
//!
//! Everything here is meant to run under a paused tokio clock.

// Not every suite uses every helper
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use waav_agent::core::dispatcher::{SynthesisOutcome, synthesis_slots};
use waav_agent::core::llm::{ChatMessage, LLMError, LLMResult, TokenSource, TokenStream};
use waav_agent::core::pipeline::{TurnOutcome, TurnResources};
use waav_agent::core::sentence::{Sentence, SentencePolicy};
use waav_agent::core::sink::{ChannelSink, SinkEvent, TurnEventSink};
use waav_agent::core::tts::{AudioData, SynthesisClient, TTSError, TTSResult};

// =============================================================================
// Token source
// =============================================================================

#[derive(Debug, Clone)]
pub enum Step {
    Fragment(&'static str),
    /// Yield a terminal stream error
    Fail(&'static str),
}

/// Plays one script per `stream` call and records every prompt it was given.
pub struct ScriptedTokenSource {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    gap: Duration,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedTokenSource {
    pub fn new(scripts: Vec<Vec<Step>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            gap: Duration::from_millis(10),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A single script made of plain fragments.
    pub fn fragments(parts: &[&'static str]) -> Self {
        Self::new(vec![steps(parts)])
    }

    pub fn with_gap(mut self, gap: Duration) -> Self {
        self.gap = gap;
        self
    }

    pub fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }
}

pub fn steps(parts: &[&'static str]) -> Vec<Step> {
    parts.iter().map(|p| Step::Fragment(*p)).collect()
}

#[async_trait]
impl TokenSource for ScriptedTokenSource {
    async fn stream(
        &self,
        messages: Vec<ChatMessage>,
        stop: CancellationToken,
    ) -> LLMResult<TokenStream> {
        self.prompts.lock().push(messages);
        let script = self.scripts.lock().pop_front().unwrap_or_default();
        let gap = self.gap;

        Ok(Box::pin(async_stream::stream! {
            for step in script {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(gap) => {}
                }
                match step {
                    Step::Fragment(text) => yield Ok(text.to_string()),
                    Step::Fail(reason) => {
                        yield Err(LLMError::StreamError(reason.to_string()));
                        break;
                    }
                }
            }
        }))
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

// =============================================================================
// Synthesis client
// =============================================================================

/// Synthesis client whose audio is the sentence text itself.
///
/// Latency is chosen per sentence; sentences in `failing` return a provider
/// error after their latency elapses.
pub struct LatencySynth {
    default_latency: Duration,
    latencies: HashMap<String, Duration>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl LatencySynth {
    pub fn new(default_latency: Duration) -> Self {
        Self {
            default_latency,
            latencies: HashMap::new(),
            failing: HashSet::new(),
            panicking: HashSet::new(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, text: &str, latency: Duration) -> Self {
        self.latencies.insert(text.to_string(), latency);
        self
    }

    pub fn failing_on(mut self, text: &str) -> Self {
        self.failing.insert(text.to_string());
        self
    }

    /// The call for `text` panics after its latency elapses.
    pub fn panicking_on(mut self, text: &str) -> Self {
        self.panicking.insert(text.to_string());
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl SynthesisClient for LatencySynth {
    async fn synthesize(&self, text: &str) -> TTSResult<AudioData> {
        self.calls.lock().push(text.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        let latency = self
            .latencies
            .get(text)
            .copied()
            .unwrap_or(self.default_latency);
        tokio::time::sleep(latency).await;

        if self.panicking.contains(text) {
            panic!("synthesizer crashed on '{text}'");
        }
        if self.failing.contains(text) {
            return Err(TTSError::ProviderError(format!("500: cannot say '{text}'")));
        }
        Ok(AudioData::new(text.as_bytes().to_vec(), "pcm", 24000))
    }

    fn provider_name(&self) -> &'static str {
        "latency-mock"
    }
}

// =============================================================================
// Stalling sink
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stall {
    SentenceText,
    SentenceAudio,
}

/// Records like [`ChannelSink`] but never returns from one kind of call,
/// the way a client that stopped reading its socket backs up a bounded
/// writer. Turn completions always go through.
pub struct StallingSink {
    inner: ChannelSink,
    stall: Stall,
}

impl StallingSink {
    pub fn new(stall: Stall) -> (Self, UnboundedReceiver<SinkEvent>) {
        let (inner, rx) = ChannelSink::new();
        (Self { inner, stall }, rx)
    }
}

#[async_trait]
impl TurnEventSink for StallingSink {
    async fn on_sentence_text(&self, turn_id: u64, sentence: &Sentence) {
        if self.stall == Stall::SentenceText {
            std::future::pending::<()>().await;
        }
        self.inner.on_sentence_text(turn_id, sentence).await;
    }

    async fn on_sentence_audio(&self, turn_id: u64, sentence: &Sentence, outcome: &SynthesisOutcome) {
        if self.stall == Stall::SentenceAudio {
            std::future::pending::<()>().await;
        }
        self.inner.on_sentence_audio(turn_id, sentence, outcome).await;
    }

    async fn on_turn_complete(&self, outcome: &TurnOutcome) {
        self.inner.on_turn_complete(outcome).await;
    }
}

// =============================================================================
// Wiring and sink helpers
// =============================================================================

pub fn resources(
    tokens: Arc<ScriptedTokenSource>,
    synth: Arc<LatencySynth>,
    concurrency: usize,
) -> (TurnResources, UnboundedReceiver<SinkEvent>) {
    let (sink, rx) = ChannelSink::new();
    (
        TurnResources {
            token_source: tokens,
            synthesizer: synth,
            slots: synthesis_slots(concurrency),
            sink: Arc::new(sink),
            policy: SentencePolicy::default(),
        },
        rx,
    )
}

pub fn drain(rx: &mut UnboundedReceiver<SinkEvent>) -> Vec<SinkEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn sentence_texts(events: &[SinkEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            SinkEvent::SentenceText { sentence, .. } => Some(sentence.text.clone()),
            _ => None,
        })
        .collect()
}

/// `(turn_id, seq)` of every audio emission, in emission order.
pub fn audio_order(events: &[SinkEvent]) -> Vec<(u64, u64)> {
    events
        .iter()
        .filter_map(|e| match e {
            SinkEvent::SentenceAudio {
                turn_id, sentence, ..
            } => Some((*turn_id, sentence.seq)),
            _ => None,
        })
        .collect()
}

/// Audio payloads decoded back to text; failures show as `None`.
pub fn audio_texts(events: &[SinkEvent]) -> Vec<Option<String>> {
    events
        .iter()
        .filter_map(|e| match e {
            SinkEvent::SentenceAudio { outcome, .. } => Some(match outcome {
                SynthesisOutcome::Audio(audio) => {
                    Some(String::from_utf8_lossy(&audio.data).into_owned())
                }
                SynthesisOutcome::Failed { .. } => None,
            }),
            _ => None,
        })
        .collect()
}

pub fn completions(events: &[SinkEvent]) -> Vec<TurnOutcome> {
    events
        .iter()
        .filter_map(|e| match e {
            SinkEvent::TurnComplete(outcome) => Some(outcome.clone()),
            _ => None,
        })
        .collect()
}
