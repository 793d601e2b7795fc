//! Base traits and types for streaming speech-synthesis providers.
//!
//! A provider adapter owns exactly one external synthesis stream. Its
//! lifecycle is exposed as a single ordered event stream: `Opened` once the
//! stream is negotiated, zero or more `Chunk`s of raw audio, `Flushed` when
//! the provider has delivered all audio for the submitted text, `Errored`
//! on any provider-side failure, and finally `Closed`. No events are
//! delivered after `Closed`.
//!
//! # Audio Format
//!
//! All providers emit PCM 16-bit signed little-endian at 24kHz, mono.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during speak operations.
#[derive(Debug, Error)]
pub enum SpeakError {
    /// Connection to the provider failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Provider-specific error
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type for speak operations.
pub type SpeakResult<T> = Result<T, SpeakError>;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a streaming synthesis session.
#[derive(Debug, Clone)]
pub struct SpeakConfig {
    /// API key for authentication
    pub api_key: String,

    /// Voice/model identifier (e.g., "aura-2-thalia-en")
    pub model: String,

    /// Sample format tag (e.g., "linear16")
    pub encoding: String,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Endpoint override. When `None` the provider's default endpoint is
    /// used; tests point this at a local mock server.
    pub endpoint: Option<String>,
}

impl Default for SpeakConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "aura-2-thalia-en".to_string(),
            encoding: "linear16".to_string(),
            sample_rate: 24000,
            endpoint: None,
        }
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Connection state for speak providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected to the provider
    #[default]
    Disconnected,
    /// Currently connecting
    Connecting,
    /// Connected and ready for text
    Connected,
    /// Stream closed (by either side)
    Closed,
    /// Connection failed
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Closed => write!(f, "Closed"),
            ConnectionState::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Uniform event stream emitted by a provider adapter.
#[derive(Debug)]
pub enum SpeakEvent {
    /// Stream negotiated; the caller may now submit text and flush.
    Opened,
    /// One fragment of raw audio, forwarded verbatim from the provider.
    Chunk(Bytes),
    /// All audio for the submitted text has been delivered.
    Flushed,
    /// Provider-side failure. The adapter transitions to closed.
    Errored(String),
    /// Stream ended; no further events follow.
    Closed,
}

// =============================================================================
// Base Trait
// =============================================================================

/// Base trait for streaming speech-synthesis providers.
///
/// Events are delivered over the channel returned by [`connect`]; the
/// adapter never invokes callbacks. Text submitted before the `Opened`
/// event has been observed is rejected with [`SpeakError::NotConnected`].
///
/// [`connect`]: BaseSpeak::connect
#[async_trait]
pub trait BaseSpeak: Send + Sync {
    /// Establish the synthesis stream and return its event channel.
    ///
    /// `Opened` is emitted on the channel once negotiation completes.
    async fn connect(&mut self) -> SpeakResult<mpsc::Receiver<SpeakEvent>>;

    /// Submit text to synthesize. Valid only after `Opened`.
    async fn send_text(&mut self, text: &str) -> SpeakResult<()>;

    /// Signal end-of-input for the current request, triggering final audio
    /// delivery and the `Flushed` marker.
    async fn flush(&mut self) -> SpeakResult<()>;

    /// Request termination of the underlying stream.
    ///
    /// Idempotent and safe to call from any state; only the first call
    /// takes effect.
    async fn request_close(&mut self) -> SpeakResult<()>;

    /// Check if the provider is connected and ready for text.
    fn is_ready(&self) -> bool;

    /// Get the current connection state.
    fn connection_state(&self) -> ConnectionState;
}

/// Boxed trait object for speak providers.
pub type BoxedSpeak = Box<dyn BaseSpeak>;

// =============================================================================
// Factory
// =============================================================================

/// List of supported speak provider names.
pub fn get_supported_speak_providers() -> Vec<&'static str> {
    vec!["deepgram"]
}

/// Create a speak provider by name.
///
/// Recognizes provider aliases case-insensitively.
pub fn create_speak_provider(name: &str, config: SpeakConfig) -> SpeakResult<BoxedSpeak> {
    match name.to_lowercase().as_str() {
        "deepgram" | "dg" => Ok(Box::new(super::deepgram::DeepgramSpeak::new(config)?)),
        _ => Err(SpeakError::InvalidConfiguration(format!(
            "Unsupported speak provider: {}. Supported: {:?}",
            name,
            get_supported_speak_providers()
        ))),
    }
}
