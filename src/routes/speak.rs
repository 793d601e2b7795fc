//! Speak WebSocket route.

use std::sync::Arc;

use axum::{Router, routing::get};

use crate::handlers::speak::speak_handler;
use crate::state::AppState;

/// Create the router for the speak WebSocket endpoint.
pub fn create_speak_router() -> Router<Arc<AppState>> {
    Router::new().route("/speak", get(speak_handler))
}
