//! Deepgram Speak streaming TTS provider.
//!
//! Wraps the Deepgram Speak WebSocket API
//! (<https://developers.deepgram.com/reference/text-to-speech-api/speak-streaming>):
//! text goes up as JSON control messages, audio comes back as raw binary
//! frames in the configured encoding.

mod client;
mod config;
mod messages;

pub use client::DeepgramSpeak;
pub use config::DeepgramSpeakConfig;
pub use messages::{DeepgramClientMessage, DeepgramServerMessage};
