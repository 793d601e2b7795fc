pub mod client;
pub mod config;
pub mod core;
pub mod handlers;
pub mod playback;
pub mod routes;
pub mod state;

// Re-export commonly used items for convenience
pub use client::RelayClient;
pub use config::ServerConfig;
pub use crate::core::speak::{BaseSpeak, SpeakConfig, SpeakError, SpeakEvent, SpeakResult};
pub use playback::{PlaybackSession, decode_pcm16le};
pub use state::AppState;
