//! Speak relay WebSocket handler.

pub mod handler;
pub mod messages;

pub use handler::speak_handler;
pub use messages::{IncomingMessage, OutgoingMessage, SpeakMessageRoute};
