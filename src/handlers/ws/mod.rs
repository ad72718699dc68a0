//! Voice agent WebSocket
//!
//! # Protocol
//!
//! ## Client → Server
//!
//! - **user_text**: Typed utterance; starts a turn (cancelling any active one)
//! - **cancel**: Cancel the active turn
//! - **end_call**: Tear the session down and close
//! - **Binary frames**: Audio (PCM 16-bit mono) for live transcription
//!
//! ## Server → Client
//!
//! - **ready**: Session established
//! - **transcript**: Speech recognized from the client's audio
//! - **sentence**: Sentence text as soon as it is detected
//! - **audio** / **audio_failed**: Per-sentence audio, strictly in sentence order
//! - **turn_complete**: Full reply text and final status
//! - **error**: Error with a machine-readable code

mod handler;
pub mod messages;
pub mod sink;

pub use handler::ws_agent_handler;
pub use messages::{IncomingMessage, MessageRoute, OutgoingMessage};
pub use sink::WsSink;
