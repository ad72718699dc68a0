//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `ws` - Voice agent WebSocket

pub mod api;
pub mod ws;

pub use ws::ws_agent_handler;
