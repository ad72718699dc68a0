use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::info;

use crate::config::{ServerConfig, SynthesisPoolScope};
use crate::core::dispatcher::synthesis_slots;
use crate::core::session::SessionRegistry;

/// Shared state handed to every route.
pub struct AppState {
    pub config: ServerConfig,
    pub registry: Arc<SessionRegistry>,
    /// Process-wide synthesis pool; `None` when each session owns its own.
    pub synthesis_slots: Option<Arc<Semaphore>>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let synthesis_slots = match config.synthesis_pool_scope {
            SynthesisPoolScope::Process => Some(synthesis_slots(config.synthesis_concurrency)),
            SynthesisPoolScope::Session => None,
        };

        info!(
            synthesis_concurrency = config.synthesis_concurrency,
            pool_scope = %config.synthesis_pool_scope,
            llm_provider = %config.llm_provider,
            tts_provider = %config.tts_provider,
            "Application state initialized"
        );

        Arc::new(Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            synthesis_slots,
        })
    }

    pub fn active_sessions(&self) -> usize {
        self.registry.len()
    }
}
