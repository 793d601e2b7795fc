//! Configuration module for the speak-relay server.
//!
//! Configuration comes from environment variables (with `.env` support via
//! `dotenvy`, loaded in `main` before anything reads the environment) and
//! may be overridden by CLI flags.
//!
//! # Example
//! ```rust,no_run
//! use speak_relay::config::ServerConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::from_env()?;
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

/// Default listening host.
const DEFAULT_HOST: &str = "0.0.0.0";

/// Default listening port.
const DEFAULT_PORT: u16 = 3000;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

/// Server configuration.
///
/// Contains the listening address and the synthesis provider settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind
    pub host: String,
    /// Port to bind
    pub port: u16,
    /// Deepgram API key; synthesis requests fail with an error reply to
    /// the client when absent
    pub deepgram_api_key: Option<String>,
    /// Deepgram Speak endpoint override (tests and proxies)
    pub deepgram_speak_url: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Recognized variables: `HOST`, `PORT`, `DEEPGRAM_API_KEY`,
    /// `DEEPGRAM_SPEAK_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());

        let port = match std::env::var("PORT") {
            Ok(value) => value.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                name: "PORT".to_string(),
                value,
            })?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self {
            host,
            port,
            deepgram_api_key: read_nonempty("DEEPGRAM_API_KEY"),
            deepgram_speak_url: read_nonempty("DEEPGRAM_SPEAK_URL"),
        })
    }

    /// Socket address string for binding.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            deepgram_api_key: None,
            deepgram_speak_url: None,
        }
    }
}

/// Clear the provider credential from memory when the config is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.deepgram_api_key {
            key.zeroize();
        }
    }
}

fn read_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
