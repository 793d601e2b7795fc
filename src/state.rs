//! Shared application state.

use std::sync::Arc;

use crate::config::ServerConfig;

/// Application state shared by all handlers.
pub struct AppState {
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Arc::new(Self { config })
    }
}
