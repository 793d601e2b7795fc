//! Health check endpoint.

use axum::Json;
use serde_json::{Value, json};

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "speak-relay",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
