//! Deepgram Speak WebSocket message types.
//!
//! Audio itself arrives as raw binary frames; only control traffic is JSON.

use serde::{Deserialize, Serialize};

/// Control messages sent to Deepgram.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeepgramClientMessage {
    /// Submit text to synthesize
    Speak { text: String },
    /// Signal end-of-input, triggering final audio delivery
    Flush,
    /// Close the stream
    Close,
}

/// Control messages received from Deepgram.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeepgramServerMessage {
    /// Stream metadata sent after connection
    Metadata {
        #[serde(default)]
        request_id: Option<String>,
    },
    /// All audio for the flushed input has been delivered
    Flushed {
        #[serde(default)]
        sequence_id: Option<u64>,
    },
    /// Provider-reported problem with the request
    Warning {
        description: String,
        #[serde(default)]
        code: Option<String>,
    },
    /// Provider-reported error
    Error {
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
}

impl DeepgramServerMessage {
    /// Human-readable description for Warning/Error variants.
    pub fn failure_message(&self) -> Option<String> {
        match self {
            DeepgramServerMessage::Warning { description, code } => Some(match code {
                Some(code) => format!("{description} ({code})"),
                None => description.clone(),
            }),
            DeepgramServerMessage::Error {
                description,
                message,
            } => Some(
                description
                    .clone()
                    .or_else(|| message.clone())
                    .unwrap_or_else(|| "unknown provider error".to_string()),
            ),
            _ => None,
        }
    }
}
