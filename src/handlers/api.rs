use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub active_sessions: usize,
    pub llm_provider: String,
    pub tts_provider: String,
    pub synthesis_concurrency: usize,
}

/// Health check handler
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        version: env!("CARGO_PKG_VERSION"),
        active_sessions: state.active_sessions(),
        llm_provider: state.config.llm_provider.clone(),
        tts_provider: state.config.tts_provider.clone(),
        synthesis_concurrency: state.config.synthesis_concurrency,
    })
}
