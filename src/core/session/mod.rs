//! One conversation: history, the active turn, and lifecycle.
//!
//! A [`Session`] is owned by its connection task. At most one turn runs at a
//! time; starting a new one cancels and awaits the previous. History is
//! committed only for turns that complete naturally, so it always alternates
//! user/assistant starting with a user entry.

mod history;
mod registry;

pub use history::ConversationHistory;
pub use registry::{SessionHandle, SessionRegistry, spawn_idle_sweeper};

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::core::dispatcher::synthesis_slots;
use crate::core::llm::create_token_source;
use crate::core::pipeline::{TurnOutcome, TurnPipeline, TurnResources, TurnState, TurnStatus};
use crate::core::sink::TurnEventSink;
use crate::core::tts::create_synthesis_client;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Missing credentials or an unsupported provider; nothing was created.
    #[error("Session configuration error: {0}")]
    Configuration(String),

    #[error("Turn failed: {0}")]
    TurnFailed(String),

    #[error("Session is closed")]
    Closed,
}

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub system_prompt: Option<String>,
    pub max_history_messages: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_history_messages: 40,
        }
    }
}

struct ActiveTurn {
    id: u64,
    cancel: CancellationToken,
    state: watch::Receiver<TurnState>,
    handle: JoinHandle<TurnOutcome>,
}

pub struct Session {
    id: String,
    config: SessionConfig,
    resources: TurnResources,
    history: ConversationHistory,
    active: Option<ActiveTurn>,
    next_turn_id: u64,
    handle: SessionHandle,
    closed: bool,
}

impl Session {
    /// Build a session from explicit collaborators.
    pub fn new(id: impl Into<String>, config: SessionConfig, resources: TurnResources) -> Self {
        let id = id.into();
        let history = ConversationHistory::new(config.max_history_messages);
        Self {
            handle: SessionHandle::new(id.clone()),
            id,
            config,
            resources,
            history,
            active: None,
            next_turn_id: 1,
            closed: false,
        }
    }

    /// Build a session with the configured LLM and TTS providers.
    ///
    /// `shared_slots` is the process-wide synthesis pool when K is a global
    /// budget; `None` gives this session its own pool of K slots.
    pub fn from_config(
        id: impl Into<String>,
        config: &ServerConfig,
        sink: Arc<dyn TurnEventSink>,
        shared_slots: Option<Arc<Semaphore>>,
    ) -> SessionResult<Self> {
        let token_source = create_token_source(&config.llm_provider, config.llm_config())
            .map_err(|e| SessionError::Configuration(e.to_string()))?;
        let synthesizer = create_synthesis_client(&config.tts_provider, config.tts_config())
            .map_err(|e| SessionError::Configuration(e.to_string()))?;

        let resources = TurnResources {
            token_source,
            synthesizer,
            slots: shared_slots.unwrap_or_else(|| synthesis_slots(config.synthesis_concurrency)),
            sink,
            policy: config.sentence_policy(),
        };
        let session_config = SessionConfig {
            system_prompt: config.system_prompt.clone(),
            max_history_messages: config.max_history_messages,
        };

        Ok(Self::new(id, session_config, resources))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Registry view of this session.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn has_active_turn(&self) -> bool {
        self.active.is_some()
    }

    pub fn current_turn_id(&self) -> Option<u64> {
        self.active.as_ref().map(|turn| turn.id)
    }

    pub fn turn_state(&self) -> Option<TurnState> {
        self.active.as_ref().map(|turn| *turn.state.borrow())
    }

    pub fn last_activity(&self) -> Instant {
        self.handle.last_activity()
    }

    pub fn touch(&self) {
        self.handle.touch();
    }

    /// Start a turn for `input`, cancelling any turn still running.
    pub async fn start_turn(&mut self, input: &str) -> SessionResult<u64> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        let input = input.trim();
        if input.is_empty() {
            return Err(SessionError::TurnFailed("empty user input".to_string()));
        }

        self.cancel_turn().await;

        let turn_id = self.next_turn_id;
        self.next_turn_id += 1;

        let messages = self
            .history
            .prompt(self.config.system_prompt.as_deref(), input);
        let pipeline = TurnPipeline::new(turn_id, input, self.resources.clone());
        let state = pipeline.subscribe();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(pipeline.run(messages, cancel.clone()));

        self.active = Some(ActiveTurn {
            id: turn_id,
            cancel,
            state,
            handle,
        });
        self.handle.set_active_turn(true);
        self.touch();
        info!(session_id = %self.id, turn_id, "Turn queued");
        Ok(turn_id)
    }

    /// Resolve when the active turn finishes; pending forever when idle.
    ///
    /// Cancel-safe, so it can sit in a `select!` next to transport reads.
    pub async fn turn_finished(&mut self) -> TurnOutcome {
        let Some(active) = self.active.as_mut() else {
            return std::future::pending().await;
        };
        let result = (&mut active.handle).await;
        let turn_id = active.id;
        self.active = None;
        self.settle(turn_id, result)
    }

    /// Cancel the active turn and wait for it to stop.
    ///
    /// Returns the turn's outcome, which is only `Completed` if it finished
    /// before the cancel landed.
    pub async fn cancel_turn(&mut self) -> Option<TurnOutcome> {
        let active = self.active.take()?;
        active.cancel.cancel();
        let result = active.handle.await;
        Some(self.settle(active.id, result))
    }

    /// Cancel any active turn and close the session.
    pub async fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.cancel_turn().await;
        self.closed = true;
        info!(
            session_id = %self.id,
            history = self.history.len(),
            "Session torn down"
        );
    }

    fn settle(
        &mut self,
        turn_id: u64,
        result: Result<TurnOutcome, tokio::task::JoinError>,
    ) -> TurnOutcome {
        self.handle.set_active_turn(false);
        self.touch();

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(session_id = %self.id, turn_id, "Turn task failed: {}", e);
                TurnOutcome {
                    turn_id,
                    input: String::new(),
                    output: String::new(),
                    status: TurnStatus::Failed,
                    sentences: 0,
                    failed_sentences: 0,
                    error: Some(e.to_string()),
                }
            }
        };

        if outcome.is_completed() {
            self.history
                .commit_turn(outcome.input.clone(), outcome.output.clone());
            debug!(session_id = %self.id, turn_id, history = self.history.len(), "History updated");
        }
        outcome
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
        }
    }
}
