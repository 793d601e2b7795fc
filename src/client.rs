//! Native relay client.
//!
//! Connects to the speak gateway, submits one text request, and schedules
//! every incoming audio frame onto a playback timeline. Once the server
//! signals `done`, the completion watcher polls the clock until everything
//! scheduled has played out.

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use thiserror::Error;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};

use crate::playback::{
    PlaybackClock, PlaybackSession, ScheduledChunk, wait_for_completion,
};

/// Client-side errors. None of these are retried; the caller resets its
/// playback state and starts over.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Control messages received from the gateway.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum GatewayMessage {
    #[serde(rename = "done")]
    Done,
    #[serde(rename = "error")]
    Error { message: String },
}

/// What a completed playback session scheduled.
#[derive(Debug)]
pub struct PlaybackReport {
    /// Chunks in arrival order, each with its scheduled start time.
    pub chunks: Vec<ScheduledChunk>,
    /// Timeline position at which playback ends.
    pub next_play_time: f64,
}

/// WebSocket relay client with gap-free playback scheduling.
pub struct RelayClient {
    url: String,
}

impl RelayClient {
    /// Create a client for the given gateway WebSocket URL
    /// (e.g., `ws://127.0.0.1:3000/speak`).
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Synthesize `text` and play the resulting stream to completion.
    ///
    /// Returns once all scheduled audio has finished playing (per the
    /// completion watcher's tolerance), or an error as soon as the server
    /// reports one.
    pub async fn speak(
        &self,
        text: &str,
        clock: &dyn PlaybackClock,
    ) -> Result<PlaybackReport, ClientError> {
        let (mut ws, _response) = connect_async(&self.url)
            .await
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;

        info!(url = %self.url, "Connected to speak gateway");

        let request = serde_json::json!({ "type": "text", "text": text });
        ws.send(Message::Text(request.to_string().into()))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        // Playback timeline starts at the clock's current position.
        let mut session = PlaybackSession::new(clock.now());
        let mut chunks = Vec::new();

        while let Some(frame) = ws.next().await {
            match frame.map_err(|e| ClientError::Transport(e.to_string()))? {
                Message::Binary(data) => {
                    let chunk = session.schedule(&data, clock.now());
                    debug!(
                        bytes = data.len(),
                        start_time = chunk.start_time,
                        "Scheduled audio chunk"
                    );
                    chunks.push(chunk);
                }
                Message::Text(text) => {
                    let msg: GatewayMessage = serde_json::from_str(&text)
                        .map_err(|e| ClientError::Protocol(format!("Bad control frame: {e}")))?;
                    match msg {
                        GatewayMessage::Done => {
                            debug!(
                                chunks = chunks.len(),
                                "Stream complete, waiting for playback"
                            );
                            wait_for_completion(clock, session.next_play_time()).await;
                            let _ = ws.close(None).await;
                            return Ok(PlaybackReport {
                                chunks,
                                next_play_time: session.next_play_time(),
                            });
                        }
                        GatewayMessage::Error { message } => {
                            warn!("Gateway reported error: {message}");
                            let _ = ws.close(None).await;
                            return Err(ClientError::Server(message));
                        }
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }

        Err(ClientError::Transport(
            "Connection closed before synthesis completed".to_string(),
        ))
    }
}
