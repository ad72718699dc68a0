//! WebSocket message types for the voice agent endpoint.

use serde::{Deserialize, Serialize};

use crate::core::pipeline::TurnStatus;

/// Maximum allowed size for a typed utterance (50 KB)
pub const MAX_TEXT_SIZE: usize = 50 * 1024;

// =============================================================================
// Incoming Messages (Client -> Server)
// =============================================================================

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IncomingMessage {
    /// Typed user utterance; starts a turn
    #[serde(rename = "user_text")]
    UserText { text: String },

    /// Cancel the active turn
    #[serde(rename = "cancel")]
    Cancel,

    /// Tear the session down and close the socket
    #[serde(rename = "end_call")]
    EndCall,
}

impl IncomingMessage {
    pub fn validate_size(&self) -> Result<(), String> {
        match self {
            IncomingMessage::UserText { text } if text.len() > MAX_TEXT_SIZE => Err(format!(
                "Text too large: {} bytes (max: {} bytes)",
                text.len(),
                MAX_TEXT_SIZE
            )),
            _ => Ok(()),
        }
    }
}

// =============================================================================
// Outgoing Messages (Server -> Client)
// =============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum OutgoingMessage {
    #[serde(rename = "ready")]
    Ready { session_id: String },

    /// Speech recognized from the client's audio
    #[serde(rename = "transcript")]
    Transcript { text: String, is_final: bool },

    /// Sentence text, sent as soon as it is detected
    #[serde(rename = "sentence")]
    Sentence { turn_id: u64, seq: u64, text: String },

    /// Base64 audio for one sentence, in sentence order
    #[serde(rename = "audio")]
    Audio {
        turn_id: u64,
        seq: u64,
        format: String,
        sample_rate: u32,
        data: String,
    },

    /// Placeholder for a sentence whose synthesis failed
    #[serde(rename = "audio_failed")]
    AudioFailed {
        turn_id: u64,
        seq: u64,
        reason: String,
    },

    #[serde(rename = "turn_complete")]
    TurnComplete {
        turn_id: u64,
        text: String,
        status: TurnStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    #[serde(rename = "error")]
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        message: String,
    },
}

impl OutgoingMessage {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        OutgoingMessage::Error {
            code: Some(code.to_string()),
            message: message.into(),
        }
    }
}

/// What the socket writer task should do next.
#[derive(Debug)]
pub enum MessageRoute {
    Outgoing(OutgoingMessage),
    Close,
}
