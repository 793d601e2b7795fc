//! Deepgram Speak connection configuration.

use url::Url;

use crate::core::speak::base::{SpeakConfig, SpeakError, SpeakResult};

/// Default Deepgram Speak WebSocket endpoint.
pub const DEFAULT_SPEAK_ENDPOINT: &str = "wss://api.deepgram.com/v1/speak";

/// Deepgram-specific view of a [`SpeakConfig`].
#[derive(Debug, Clone)]
pub struct DeepgramSpeakConfig {
    /// API key sent as `Authorization: Token <key>`.
    pub api_key: String,
    /// Voice model (e.g., "aura-2-thalia-en").
    pub model: String,
    /// Audio encoding tag (e.g., "linear16").
    pub encoding: String,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Endpoint the WebSocket connects to.
    pub endpoint: String,
}

impl DeepgramSpeakConfig {
    pub fn from_speak_config(config: SpeakConfig) -> Self {
        Self {
            endpoint: config
                .endpoint
                .unwrap_or_else(|| DEFAULT_SPEAK_ENDPOINT.to_string()),
            api_key: config.api_key,
            model: config.model,
            encoding: config.encoding,
            sample_rate: config.sample_rate,
        }
    }

    /// Build the WebSocket URL with model/encoding/sample_rate query
    /// parameters.
    pub fn websocket_url(&self) -> SpeakResult<Url> {
        let mut url = Url::parse(&self.endpoint).map_err(|e| {
            SpeakError::InvalidConfiguration(format!("Invalid endpoint URL: {e}"))
        })?;

        url.query_pairs_mut()
            .append_pair("model", &self.model)
            .append_pair("encoding", &self.encoding)
            .append_pair("sample_rate", &self.sample_rate.to_string());

        Ok(url)
    }

    /// Authorization header value.
    pub fn auth_header(&self) -> SpeakResult<String> {
        if self.api_key.is_empty() {
            return Err(SpeakError::InvalidConfiguration(
                "Missing API key in provider configuration".to_string(),
            ));
        }
        Ok(format!("Token {}", self.api_key))
    }
}
