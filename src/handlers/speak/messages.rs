//! Speak WebSocket message types.
//!
//! Control traffic is JSON over text frames; audio travels as raw binary
//! frames with no envelope. The two are distinguished by frame type, never
//! by payload inspection.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Maximum allowed size for text to synthesize (50 KB)
pub const MAX_TEXT_SIZE: usize = 50 * 1024;

// =============================================================================
// Incoming Messages (Client -> Server)
// =============================================================================

/// Incoming WebSocket control messages from the client.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum IncomingMessage {
    /// Request synthesis of a text string
    #[serde(rename = "text")]
    Text {
        /// Text content to synthesize
        text: String,
    },
}

// =============================================================================
// Outgoing Messages (Server -> Client)
// =============================================================================

/// Outgoing WebSocket control messages to the client.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum OutgoingMessage {
    /// All audio for the current request has been sent
    #[serde(rename = "done")]
    Done,

    /// Error message
    #[serde(rename = "error")]
    Error {
        /// Error message
        message: String,
    },
}

// =============================================================================
// Message Routing
// =============================================================================

/// Message routing for the per-connection socket sender task.
pub enum SpeakMessageRoute {
    /// JSON control message
    Outgoing(OutgoingMessage),
    /// Binary audio data
    Audio(Bytes),
    /// Close the connection
    Close,
}

// =============================================================================
// Validation
// =============================================================================

/// Error type for message validation failures.
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// Text content exceeds the maximum allowed size
    TextTooLarge { size: usize, max: usize },
    /// Text content is empty
    TextEmpty,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TextTooLarge { size, max } => {
                write!(f, "Text too large: {} bytes (max: {} bytes)", size, max)
            }
            Self::TextEmpty => write!(f, "Text must not be empty"),
        }
    }
}

impl std::error::Error for ValidationError {}

impl IncomingMessage {
    /// Validates field sizes to prevent resource exhaustion.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            IncomingMessage::Text { text } => {
                if text.is_empty() {
                    return Err(ValidationError::TextEmpty);
                }
                let size = text.len();
                if size > MAX_TEXT_SIZE {
                    return Err(ValidationError::TextTooLarge {
                        size,
                        max: MAX_TEXT_SIZE,
                    });
                }
            }
        }
        Ok(())
    }
}
