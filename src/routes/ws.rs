//! Voice agent WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::ws::ws_agent_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the agent WebSocket router
///
/// # Endpoint
///
/// `GET /ws` - WebSocket upgrade for one conversation session
///
/// # Example
///
/// ```json
/// // Server greets
/// {"type": "ready", "session_id": "..."}
///
/// // Client types an utterance
/// {"type": "user_text", "text": "What's the weather like?"}
///
/// // Server streams sentences, then ordered audio, then completion
/// {"type": "sentence", "turn_id": 1, "seq": 0, "text": "It is sunny."}
/// {"type": "audio", "turn_id": 1, "seq": 0, "format": "mp3", "sample_rate": 24000, "data": "..."}
/// {"type": "turn_complete", "turn_id": 1, "text": "It is sunny.", "status": "completed"}
/// ```
pub fn create_ws_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws", get(ws_agent_handler))
        .layer(TraceLayer::new_for_http())
}
