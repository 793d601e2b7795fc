//! Speak relay WebSocket handler.
//!
//! One relay session per client connection. The session bridges the client
//! socket to a streaming synthesis provider: inbound `text` control frames
//! open a provider stream, and provider audio is forwarded back to the
//! client as raw binary frames the moment it arrives.
//!
//! Session state machine:
//!
//! ```text
//! Idle -> AwaitingProviderOpen -> Streaming -> Draining -> Idle   (loops)
//!   \________________ any state -> Closed on disconnect _________/
//! ```

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::sync::Arc;
use tokio::select;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::speak::{BoxedSpeak, SpeakConfig, SpeakEvent, create_speak_provider};
use crate::state::AppState;

use super::messages::{IncomingMessage, OutgoingMessage, SpeakMessageRoute};

/// Buffer size for the socket sender channel. This is the only bound on
/// audio buffered for a slow client; when it fills, provider event
/// processing stalls instead of growing memory without limit.
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// Provider used for synthesis.
const SPEAK_PROVIDER: &str = "deepgram";

// =============================================================================
// Session State
// =============================================================================

/// Relay session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// No active synthesis; ready for a text request
    Idle,
    /// Provider stream requested, waiting for it to open
    AwaitingProviderOpen,
    /// Forwarding provider audio to the client
    Streaming,
    /// Final control traffic sent; returning to Idle
    Draining,
    /// Transport disconnected; terminal
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::AwaitingProviderOpen => write!(f, "AwaitingProviderOpen"),
            SessionState::Streaming => write!(f, "Streaming"),
            SessionState::Draining => write!(f, "Draining"),
            SessionState::Closed => write!(f, "Closed"),
        }
    }
}

// =============================================================================
// Handler
// =============================================================================

/// Speak WebSocket handler.
///
/// Upgrades the HTTP connection to WebSocket and runs the relay session
/// until the client disconnects.
pub async fn speak_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("Speak WebSocket connection upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_speak_socket(socket, state))
}

/// Relay session for one client connection.
struct SpeakSession {
    session_id: String,
    state: SessionState,
    adapter: Option<BoxedSpeak>,
    events: Option<mpsc::Receiver<SpeakEvent>>,
    pending_text: Option<String>,
    message_tx: mpsc::Sender<SpeakMessageRoute>,
}

impl SpeakSession {
    fn new(message_tx: mpsc::Sender<SpeakMessageRoute>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            state: SessionState::Idle,
            adapter: None,
            events: None,
            pending_text: None,
            message_tx,
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(
            session_id = %self.session_id,
            "Session state: {} -> {}",
            self.state,
            next
        );
        self.state = next;
    }

    async fn send_error(&self, message: String) {
        let _ = self
            .message_tx
            .send(SpeakMessageRoute::Outgoing(OutgoingMessage::Error {
                message,
            }))
            .await;
    }

    /// Close the live adapter, if any. The adapter's own close is
    /// idempotent; dropping it here also stops its connection task.
    async fn close_adapter(&mut self) {
        if let Some(mut adapter) = self.adapter.take()
            && let Err(e) = adapter.request_close().await
        {
            warn!(session_id = %self.session_id, "Adapter close failed: {e}");
        }
        self.events = None;
        self.pending_text = None;
    }

    /// Handle a `text` control message from the client.
    async fn handle_text_request(&mut self, text: String, app_state: &Arc<AppState>) {
        match self.state {
            SessionState::Idle => {}
            SessionState::AwaitingProviderOpen | SessionState::Streaming => {
                // A second request before the current one finishes is
                // rejected rather than queued.
                self.send_error("Synthesis already in progress".to_string())
                    .await;
                return;
            }
            SessionState::Draining | SessionState::Closed => {
                self.send_error(format!("Session not ready (state: {})", self.state))
                    .await;
                return;
            }
        }

        let Some(api_key) = app_state.config.deepgram_api_key.clone() else {
            self.send_error("Speak provider credential not configured".to_string())
                .await;
            return;
        };

        // At most one adapter per session; a new request supersedes and
        // closes any stale stream left over from the previous one.
        self.close_adapter().await;

        let speak_config = SpeakConfig {
            api_key,
            endpoint: app_state.config.deepgram_speak_url.clone(),
            ..Default::default()
        };

        let mut adapter = match create_speak_provider(SPEAK_PROVIDER, speak_config) {
            Ok(adapter) => adapter,
            Err(e) => {
                error!(session_id = %self.session_id, "Failed to create provider: {e}");
                self.send_error(format!("Failed to create provider: {e}"))
                    .await;
                return;
            }
        };

        match adapter.connect().await {
            Ok(events) => {
                self.adapter = Some(adapter);
                self.events = Some(events);
                self.pending_text = Some(text);
                self.transition(SessionState::AwaitingProviderOpen);
            }
            Err(e) => {
                warn!(session_id = %self.session_id, "Provider connection failed: {e}");
                self.send_error(format!("Synthesis failed: {e}")).await;
            }
        }
    }

    /// Handle one event from the provider adapter.
    async fn handle_provider_event(&mut self, event: SpeakEvent) {
        match event {
            SpeakEvent::Opened => {
                if self.state != SessionState::AwaitingProviderOpen {
                    debug!(session_id = %self.session_id, "Ignoring Opened in state {}", self.state);
                    return;
                }

                let Some(text) = self.pending_text.take() else {
                    self.fail_session("No pending text for opened stream".to_string())
                        .await;
                    return;
                };

                let Some(adapter) = self.adapter.as_mut() else {
                    self.fail_session("Provider stream opened without adapter".to_string())
                        .await;
                    return;
                };

                debug!(session_id = %self.session_id, "Submitting {} bytes of text", text.len());
                let submitted = match adapter.send_text(&text).await {
                    Ok(()) => adapter.flush().await,
                    Err(e) => Err(e),
                };

                match submitted {
                    Ok(()) => self.transition(SessionState::Streaming),
                    Err(e) => {
                        self.fail_session(format!("Failed to submit text: {e}"))
                            .await;
                    }
                }
            }
            SpeakEvent::Chunk(data) => {
                if self.state != SessionState::Streaming {
                    debug!(
                        session_id = %self.session_id,
                        "Dropping {} audio bytes in state {}",
                        data.len(),
                        self.state
                    );
                    return;
                }
                // Forwarded immediately as a binary frame; no batching.
                if self
                    .message_tx
                    .send(SpeakMessageRoute::Audio(data))
                    .await
                    .is_err()
                {
                    warn!(session_id = %self.session_id, "Socket sender gone, dropping audio");
                }
            }
            SpeakEvent::Flushed => {
                if self.state != SessionState::Streaming {
                    debug!(session_id = %self.session_id, "Ignoring Flushed in state {}", self.state);
                    return;
                }
                self.transition(SessionState::Draining);
                let _ = self
                    .message_tx
                    .send(SpeakMessageRoute::Outgoing(OutgoingMessage::Done))
                    .await;
                // Drain is complete once Done is queued; the stale adapter
                // stays around until superseded or the socket closes.
                self.transition(SessionState::Idle);
            }
            SpeakEvent::Errored(message) => {
                if self.state == SessionState::Idle {
                    debug!(session_id = %self.session_id, "Stale adapter error: {message}");
                    return;
                }
                self.fail_session(format!("Synthesis failed: {message}"))
                    .await;
            }
            SpeakEvent::Closed => {
                match self.state {
                    SessionState::AwaitingProviderOpen | SessionState::Streaming => {
                        self.fail_session("Synthesis stream closed unexpectedly".to_string())
                            .await;
                    }
                    _ => {
                        debug!(session_id = %self.session_id, "Provider stream closed");
                        self.events = None;
                    }
                }
            }
        }
    }

    /// Emit exactly one error control message, release the adapter, and
    /// return the session to Idle.
    async fn fail_session(&mut self, message: String) {
        warn!(session_id = %self.session_id, "{message}");
        self.send_error(message).await;
        self.close_adapter().await;
        self.transition(SessionState::Idle);
    }
}

/// Either side of the session's select loop.
enum LoopEvent {
    Socket(Option<Result<Message, axum::Error>>),
    Provider(Option<SpeakEvent>),
}

/// Handle the speak WebSocket connection.
async fn handle_speak_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (message_tx, mut message_rx) = mpsc::channel::<SpeakMessageRoute>(CHANNEL_BUFFER_SIZE);

    // Sender task for outgoing frames
    let sender_task = tokio::spawn(async move {
        while let Some(route) = message_rx.recv().await {
            let should_close = matches!(route, SpeakMessageRoute::Close);

            let result = match route {
                SpeakMessageRoute::Outgoing(message) => match serde_json::to_string(&message) {
                    Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing message: {}", e);
                        continue;
                    }
                },
                SpeakMessageRoute::Audio(data) => sender.send(Message::Binary(data)).await,
                SpeakMessageRoute::Close => sender.send(Message::Close(None)).await,
            };

            if let Err(e) = result {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }

            if should_close {
                break;
            }
        }
    });

    let mut session = SpeakSession::new(message_tx);
    info!(session_id = %session.session_id, "Speak WebSocket connection established");

    loop {
        let loop_event = select! {
            msg_result = receiver.next() => LoopEvent::Socket(msg_result),
            event = async {
                match session.events.as_mut() {
                    Some(events) => events.recv().await,
                    None => std::future::pending().await,
                }
            } => LoopEvent::Provider(event),
        };

        match loop_event {
            LoopEvent::Socket(Some(Ok(msg))) => {
                if !process_socket_message(msg, &mut session, &app_state).await {
                    break;
                }
            }
            LoopEvent::Socket(Some(Err(e))) => {
                warn!(session_id = %session.session_id, "Speak WebSocket error: {e}");
                break;
            }
            LoopEvent::Socket(None) => {
                info!(session_id = %session.session_id, "Client disconnected");
                break;
            }
            LoopEvent::Provider(Some(event)) => {
                session.handle_provider_event(event).await;
            }
            LoopEvent::Provider(None) => {
                // Channel drained after the provider task exited.
                session.events = None;
            }
        }
    }

    // Disconnect tears down any live adapter immediately, no grace period.
    session.transition(SessionState::Closed);
    session.close_adapter().await;
    sender_task.abort();

    info!(session_id = %session.session_id, "Speak WebSocket connection terminated");
}

/// Process one inbound WebSocket frame. Returns false when the session
/// should end.
async fn process_socket_message(
    msg: Message,
    session: &mut SpeakSession,
    app_state: &Arc<AppState>,
) -> bool {
    match msg {
        Message::Text(text) => {
            debug!("Received control frame: {} bytes", text.len());

            // Malformed control frames are reported back and dropped; the
            // connection stays open.
            let incoming: IncomingMessage = match serde_json::from_str(&text) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!("Failed to parse control frame: {}", e);
                    session
                        .send_error(format!("Invalid message format: {e}"))
                        .await;
                    return true;
                }
            };

            if let Err(e) = incoming.validate() {
                warn!("Control frame validation failed: {}", e);
                session.send_error(e.to_string()).await;
                return true;
            }

            match incoming {
                IncomingMessage::Text { text } => {
                    session.handle_text_request(text, app_state).await;
                }
            }
            true
        }
        Message::Binary(data) => {
            debug!("Ignoring unexpected binary frame: {} bytes", data.len());
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            debug!("Speak WebSocket close frame received");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;

    use crate::core::speak::{BaseSpeak, ConnectionState, SpeakError, SpeakResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted adapter standing in for a provider stream.
    struct ScriptedAdapter {
        close_calls: Arc<AtomicUsize>,
        sent_texts: Arc<std::sync::Mutex<Vec<String>>>,
        flush_calls: Arc<AtomicUsize>,
        ready: bool,
    }

    impl ScriptedAdapter {
        fn new() -> (Self, Arc<AtomicUsize>, Arc<std::sync::Mutex<Vec<String>>>) {
            let close_calls = Arc::new(AtomicUsize::new(0));
            let sent_texts = Arc::new(std::sync::Mutex::new(Vec::new()));
            let adapter = Self {
                close_calls: close_calls.clone(),
                sent_texts: sent_texts.clone(),
                flush_calls: Arc::new(AtomicUsize::new(0)),
                ready: true,
            };
            (adapter, close_calls, sent_texts)
        }
    }

    #[async_trait]
    impl BaseSpeak for ScriptedAdapter {
        async fn connect(&mut self) -> SpeakResult<mpsc::Receiver<SpeakEvent>> {
            let (_tx, rx) = mpsc::channel(8);
            Ok(rx)
        }

        async fn send_text(&mut self, text: &str) -> SpeakResult<()> {
            self.sent_texts.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn flush(&mut self) -> SpeakResult<()> {
            self.flush_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn request_close(&mut self) -> SpeakResult<()> {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn is_ready(&self) -> bool {
            self.ready
        }

        fn connection_state(&self) -> ConnectionState {
            ConnectionState::Connected
        }
    }

    /// Adapter whose submissions fail.
    struct FailingAdapter;

    #[async_trait]
    impl BaseSpeak for FailingAdapter {
        async fn connect(&mut self) -> SpeakResult<mpsc::Receiver<SpeakEvent>> {
            let (_tx, rx) = mpsc::channel(8);
            Ok(rx)
        }

        async fn send_text(&mut self, _text: &str) -> SpeakResult<()> {
            Err(SpeakError::ProviderError("boom".to_string()))
        }

        async fn flush(&mut self) -> SpeakResult<()> {
            Err(SpeakError::ProviderError("boom".to_string()))
        }

        async fn request_close(&mut self) -> SpeakResult<()> {
            Ok(())
        }

        fn is_ready(&self) -> bool {
            true
        }

        fn connection_state(&self) -> ConnectionState {
            ConnectionState::Connected
        }
    }

    fn test_session() -> (SpeakSession, mpsc::Receiver<SpeakMessageRoute>) {
        let (tx, rx) = mpsc::channel(64);
        (SpeakSession::new(tx), rx)
    }

    async fn collect_outgoing(rx: &mut mpsc::Receiver<SpeakMessageRoute>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(route) = rx.try_recv() {
            match route {
                SpeakMessageRoute::Outgoing(msg) => {
                    out.push(serde_json::to_string(&msg).unwrap());
                }
                SpeakMessageRoute::Audio(data) => out.push(format!("audio:{}", data.len())),
                SpeakMessageRoute::Close => out.push("close".to_string()),
            }
        }
        out
    }

    #[tokio::test]
    async fn test_opened_submits_text_and_flushes() {
        let (mut session, _rx) = test_session();
        let (adapter, _closes, sent_texts) = ScriptedAdapter::new();

        session.adapter = Some(Box::new(adapter));
        session.pending_text = Some("hello".to_string());
        session.state = SessionState::AwaitingProviderOpen;

        session.handle_provider_event(SpeakEvent::Opened).await;

        assert_eq!(session.state, SessionState::Streaming);
        assert_eq!(sent_texts.lock().unwrap().as_slice(), ["hello"]);
    }

    #[tokio::test]
    async fn test_chunk_forwarded_while_streaming() {
        let (mut session, mut rx) = test_session();
        session.state = SessionState::Streaming;

        session
            .handle_provider_event(SpeakEvent::Chunk(Bytes::from(vec![0u8; 4800])))
            .await;

        let out = collect_outgoing(&mut rx).await;
        assert_eq!(out, ["audio:4800"]);
    }

    #[tokio::test]
    async fn test_chunk_dropped_when_idle() {
        let (mut session, mut rx) = test_session();

        session
            .handle_provider_event(SpeakEvent::Chunk(Bytes::from(vec![0u8; 100])))
            .await;

        assert!(collect_outgoing(&mut rx).await.is_empty());
    }

    #[tokio::test]
    async fn test_flushed_sends_done_and_returns_to_idle() {
        let (mut session, mut rx) = test_session();
        session.state = SessionState::Streaming;

        session.handle_provider_event(SpeakEvent::Flushed).await;

        assert_eq!(session.state, SessionState::Idle);
        let out = collect_outgoing(&mut rx).await;
        assert_eq!(out, [r#"{"type":"done"}"#]);
    }

    #[tokio::test]
    async fn test_errored_while_streaming_emits_one_error_and_recovers() {
        let (mut session, mut rx) = test_session();
        let (adapter, close_calls, _texts) = ScriptedAdapter::new();
        session.adapter = Some(Box::new(adapter));
        session.state = SessionState::Streaming;

        session
            .handle_provider_event(SpeakEvent::Errored("quota exceeded".to_string()))
            .await;

        assert_eq!(session.state, SessionState::Idle);
        assert!(session.adapter.is_none());
        assert_eq!(close_calls.load(Ordering::SeqCst), 1);

        let out = collect_outgoing(&mut rx).await;
        assert_eq!(out.len(), 1);
        assert!(out[0].contains(r#""type":"error""#));
        assert!(out[0].contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_stale_adapter_error_ignored_when_idle() {
        let (mut session, mut rx) = test_session();

        session
            .handle_provider_event(SpeakEvent::Errored("late failure".to_string()))
            .await;

        assert_eq!(session.state, SessionState::Idle);
        assert!(collect_outgoing(&mut rx).await.is_empty());
    }

    #[tokio::test]
    async fn test_submission_failure_recovers_to_idle() {
        let (mut session, mut rx) = test_session();
        session.adapter = Some(Box::new(FailingAdapter));
        session.pending_text = Some("hello".to_string());
        session.state = SessionState::AwaitingProviderOpen;

        session.handle_provider_event(SpeakEvent::Opened).await;

        assert_eq!(session.state, SessionState::Idle);
        assert!(session.adapter.is_none());
        let out = collect_outgoing(&mut rx).await;
        assert_eq!(out.len(), 1);
        assert!(out[0].contains(r#""type":"error""#));
    }

    #[tokio::test]
    async fn test_unexpected_close_while_streaming_is_an_error() {
        let (mut session, mut rx) = test_session();
        session.state = SessionState::Streaming;

        session.handle_provider_event(SpeakEvent::Closed).await;

        assert_eq!(session.state, SessionState::Idle);
        let out = collect_outgoing(&mut rx).await;
        assert_eq!(out.len(), 1);
        assert!(out[0].contains("closed unexpectedly"));
    }

    #[tokio::test]
    async fn test_second_text_request_rejected_before_streaming() {
        let (mut session, mut rx) = test_session();
        session.state = SessionState::AwaitingProviderOpen;
        let app_state = AppState::new(crate::config::ServerConfig::default());

        session
            .handle_text_request("again".to_string(), &app_state)
            .await;

        assert_eq!(session.state, SessionState::AwaitingProviderOpen);
        let out = collect_outgoing(&mut rx).await;
        assert_eq!(out.len(), 1);
        assert!(out[0].contains("already in progress"));
    }

    #[tokio::test]
    async fn test_text_request_without_credential_rejected() {
        let (mut session, mut rx) = test_session();
        let app_state = AppState::new(crate::config::ServerConfig::default());

        session
            .handle_text_request("hello".to_string(), &app_state)
            .await;

        assert_eq!(session.state, SessionState::Idle);
        let out = collect_outgoing(&mut rx).await;
        assert_eq!(out.len(), 1);
        assert!(out[0].contains("credential"));
    }

    #[tokio::test]
    async fn test_close_adapter_called_exactly_once_on_teardown() {
        let (mut session, _rx) = test_session();
        let (adapter, close_calls, _texts) = ScriptedAdapter::new();
        session.adapter = Some(Box::new(adapter));
        session.state = SessionState::Streaming;

        session.transition(SessionState::Closed);
        session.close_adapter().await;
        // A second teardown pass must not close again.
        session.close_adapter().await;

        assert_eq!(close_calls.load(Ordering::SeqCst), 1);
    }
}
