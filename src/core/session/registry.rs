//! Process-wide session registry and idle reclamation.
//!
//! The registry only sees insert-on-connect, remove-on-disconnect and the
//! sweeper's removals. Session state itself stays with the connection task;
//! the registry holds a [`SessionHandle`] that exposes just enough to decide
//! idleness and to ask the connection to shut down.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Shared view of one live session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: String,
    last_activity: Arc<Mutex<Instant>>,
    active_turn: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl SessionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            last_activity: Arc::new(Mutex::new(Instant::now())),
            active_turn: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn has_active_turn(&self) -> bool {
        self.active_turn.load(Ordering::Acquire)
    }

    pub(crate) fn set_active_turn(&self, active: bool) {
        self.active_turn.store(active, Ordering::Release);
    }

    /// Cancelled when the session should be torn down from outside.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Idle means: no turn running and nothing heard for `idle_timeout`.
    pub fn is_idle(&self, now: Instant, idle_timeout: Duration) -> bool {
        !self.has_active_turn() && now.saturating_duration_since(self.last_activity()) >= idle_timeout
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handle: SessionHandle) {
        debug!(session_id = %handle.id(), "Session registered");
        self.sessions.insert(handle.id().to_string(), handle);
    }

    pub fn remove(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.remove(id).map(|(_, handle)| handle)
    }

    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn idle_sessions(&self, now: Instant, idle_timeout: Duration) -> Vec<String> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().is_idle(now, idle_timeout))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Signal and remove every idle session; returns how many were reclaimed.
    pub fn sweep_idle(&self, now: Instant, idle_timeout: Duration) -> usize {
        let mut reclaimed = 0;
        for id in self.idle_sessions(now, idle_timeout) {
            // Re-check under the entry lock; activity may have resumed
            if let Some((_, handle)) = self
                .sessions
                .remove_if(&id, |_, handle| handle.is_idle(now, idle_timeout))
            {
                handle.shutdown.cancel();
                info!(session_id = %id, "Idle session reclaimed");
                reclaimed += 1;
            }
        }
        reclaimed
    }
}

/// Periodically reclaim idle sessions until `stop` is cancelled.
pub fn spawn_idle_sweeper(
    registry: Arc<SessionRegistry>,
    sweep_interval: Duration,
    idle_timeout: Duration,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = stop.cancelled() => {
                    debug!("Idle session sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let reclaimed = registry.sweep_idle(Instant::now(), idle_timeout);
                    if reclaimed > 0 {
                        info!(reclaimed, remaining = registry.len(), "Idle sweep complete");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE: Duration = Duration::from_secs(30 * 60);

    #[tokio::test(start_paused = true)]
    async fn test_register_and_remove() {
        let registry = SessionRegistry::new();
        registry.register(SessionHandle::new("a"));
        registry.register(SessionHandle::new("b"));
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("a"));

        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert_eq!(registry.len(), 1);
        assert!(registry.get("b").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_detection() {
        let registry = SessionRegistry::new();
        let quiet = SessionHandle::new("quiet");
        let busy = SessionHandle::new("busy");
        let chatty = SessionHandle::new("chatty");
        registry.register(quiet.clone());
        registry.register(busy.clone());
        registry.register(chatty.clone());

        tokio::time::advance(IDLE + Duration::from_secs(1)).await;
        busy.set_active_turn(true);
        chatty.touch();

        let idle = registry.idle_sessions(Instant::now(), IDLE);
        assert_eq!(idle, vec!["quiet".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_signals_and_removes() {
        let registry = SessionRegistry::new();
        let handle = SessionHandle::new("s1");
        let token = handle.shutdown_token();
        registry.register(handle);

        assert_eq!(registry.sweep_idle(Instant::now(), IDLE), 0);
        tokio::time::advance(IDLE).await;
        assert_eq!(registry.sweep_idle(Instant::now(), IDLE), 1);

        assert!(token.is_cancelled());
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_task() {
        let registry = Arc::new(SessionRegistry::new());
        let handle = SessionHandle::new("s1");
        let token = handle.shutdown_token();
        registry.register(handle);

        let stop = CancellationToken::new();
        let sweeper = spawn_idle_sweeper(
            registry.clone(),
            Duration::from_secs(60),
            Duration::from_secs(120),
            stop.clone(),
        );

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(registry.len(), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(registry.is_empty());
        assert!(token.is_cancelled());

        stop.cancel();
        sweeper.await.unwrap();
    }
}
