//! Deepgram Speak WebSocket client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use http::Request;
use http::header::AUTHORIZATION;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{handshake::client::generate_key, protocol::Message},
};
use tracing::{debug, error, info, warn};

use crate::core::speak::base::{
    BaseSpeak, ConnectionState, SpeakConfig, SpeakError, SpeakEvent, SpeakResult,
};

use super::config::DeepgramSpeakConfig;
use super::messages::{DeepgramClientMessage, DeepgramServerMessage};

/// Buffer size for the adapter event channel.
const EVENT_CHANNEL_SIZE: usize = 256;

/// Deepgram Speak provider adapter.
///
/// One instance wraps one synthesis stream. After a stream has closed or
/// errored the instance is spent; the relay session creates a fresh one
/// per text request.
pub struct DeepgramSpeak {
    config: DeepgramSpeakConfig,
    state: Arc<RwLock<ConnectionState>>,
    command_tx: Option<mpsc::UnboundedSender<DeepgramClientMessage>>,
    connection_task: Option<JoinHandle<()>>,
    close_requested: Arc<AtomicBool>,
}

impl DeepgramSpeak {
    pub fn new(config: SpeakConfig) -> SpeakResult<Self> {
        Ok(Self {
            config: DeepgramSpeakConfig::from_speak_config(config),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            command_tx: None,
            connection_task: None,
            close_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    fn set_state(state: &Arc<RwLock<ConnectionState>>, value: ConnectionState) {
        if let Ok(mut guard) = state.write() {
            *guard = value;
        }
    }

    fn send_command(&self, message: DeepgramClientMessage) -> SpeakResult<()> {
        let Some(tx) = self.command_tx.as_ref() else {
            return Err(SpeakError::NotConnected);
        };
        tx.send(message)
            .map_err(|e| SpeakError::InternalError(format!("Command channel closed: {e}")))
    }
}

#[async_trait]
impl BaseSpeak for DeepgramSpeak {
    async fn connect(&mut self) -> SpeakResult<mpsc::Receiver<SpeakEvent>> {
        Self::set_state(&self.state, ConnectionState::Connecting);

        let url = self.config.websocket_url()?;
        let auth_header = self.config.auth_header()?;
        debug!("Connecting to Deepgram Speak: {}", url);

        let host = url
            .host_str()
            .ok_or_else(|| {
                SpeakError::InvalidConfiguration("Endpoint URL has no host".to_string())
            })?
            .to_string();

        let request = Request::builder()
            .method("GET")
            .uri(url.as_str())
            .header("Host", host)
            .header("Upgrade", "websocket")
            .header("Connection", "upgrade")
            .header("Sec-WebSocket-Key", generate_key())
            .header("Sec-WebSocket-Version", "13")
            .header(AUTHORIZATION, auth_header)
            .body(())
            .map_err(|e| {
                SpeakError::ConnectionFailed(format!("Failed to build handshake request: {e}"))
            })?;

        let (ws_stream, response) = connect_async(request).await.map_err(|e| {
            Self::set_state(&self.state, ConnectionState::Failed);
            SpeakError::ConnectionFailed(format!("WebSocket connection failed: {e}"))
        })?;

        info!(
            status = ?response.status(),
            model = %self.config.model,
            "Deepgram Speak stream negotiated"
        );

        let (events_tx, events_rx) = mpsc::channel::<SpeakEvent>(EVENT_CHANNEL_SIZE);
        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<DeepgramClientMessage>();

        Self::set_state(&self.state, ConnectionState::Connected);
        let _ = events_tx.send(SpeakEvent::Opened).await;

        let state = self.state.clone();
        let close_requested = self.close_requested.clone();
        let (mut write, mut read) = ws_stream.split();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    incoming = read.next() => {
                        match incoming {
                            Some(Ok(Message::Binary(data))) => {
                                debug!("Received audio fragment: {} bytes", data.len());
                                if events_tx.send(SpeakEvent::Chunk(data)).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<DeepgramServerMessage>(&text) {
                                    Ok(msg) => {
                                        if let Some(failure) = msg.failure_message() {
                                            warn!("Deepgram reported failure: {}", failure);
                                            let _ = events_tx
                                                .send(SpeakEvent::Errored(failure))
                                                .await;
                                            break;
                                        }
                                        match msg {
                                            DeepgramServerMessage::Flushed { .. } => {
                                                let _ = events_tx
                                                    .send(SpeakEvent::Flushed)
                                                    .await;
                                            }
                                            DeepgramServerMessage::Metadata { request_id } => {
                                                debug!(?request_id, "Deepgram stream metadata");
                                            }
                                            _ => {}
                                        }
                                    }
                                    Err(_) => {
                                        debug!("Ignoring unrecognized control message: {}", text);
                                    }
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                if write.send(Message::Pong(data)).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(_))) => {
                                debug!("Deepgram closed the stream");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                if !close_requested.load(Ordering::SeqCst) {
                                    error!("Deepgram WebSocket error: {}", e);
                                    let _ = events_tx
                                        .send(SpeakEvent::Errored(e.to_string()))
                                        .await;
                                }
                                break;
                            }
                            None => {
                                debug!("Deepgram stream ended");
                                break;
                            }
                        }
                    }
                    command = command_rx.recv() => {
                        match command {
                            Some(msg) => {
                                let json = match serde_json::to_string(&msg) {
                                    Ok(json) => json,
                                    Err(e) => {
                                        error!("Failed to serialize command: {}", e);
                                        continue;
                                    }
                                };
                                if let Err(e) = write.send(Message::Text(json.into())).await {
                                    error!("Failed to send command: {}", e);
                                    if !close_requested.load(Ordering::SeqCst) {
                                        let _ = events_tx
                                            .send(SpeakEvent::Errored(e.to_string()))
                                            .await;
                                    }
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            }

            Self::set_state(&state, ConnectionState::Closed);
            let _ = events_tx.send(SpeakEvent::Closed).await;
        });

        self.command_tx = Some(command_tx);
        self.connection_task = Some(task);

        Ok(events_rx)
    }

    async fn send_text(&mut self, text: &str) -> SpeakResult<()> {
        if !self.is_ready() {
            return Err(SpeakError::NotConnected);
        }
        self.send_command(DeepgramClientMessage::Speak {
            text: text.to_string(),
        })
    }

    async fn flush(&mut self) -> SpeakResult<()> {
        if !self.is_ready() {
            return Err(SpeakError::NotConnected);
        }
        self.send_command(DeepgramClientMessage::Flush)
    }

    async fn request_close(&mut self) -> SpeakResult<()> {
        // First call wins; subsequent calls are no-ops.
        if self.close_requested.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(tx) = self.command_tx.take() {
            let _ = tx.send(DeepgramClientMessage::Close);
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.state
            .read()
            .map(|state| *state == ConnectionState::Connected)
            .unwrap_or(false)
    }

    fn connection_state(&self) -> ConnectionState {
        self.state
            .read()
            .map(|state| *state)
            .unwrap_or(ConnectionState::Disconnected)
    }
}

impl Drop for DeepgramSpeak {
    fn drop(&mut self) {
        // After a close request the pump must outlive the adapter long
        // enough to deliver the queued Close frame; it exits on its own
        // once the command channel drains. Abort only on an abandoned
        // stream that was never asked to close.
        if self.close_requested.load(Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.connection_task.take() {
            task.abort();
        }
    }
}
