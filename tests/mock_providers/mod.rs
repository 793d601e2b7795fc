//! Mock Deepgram Speak WebSocket server.
//!
//! Speaks just enough of the provider protocol for relay tests: Metadata on
//! connect, scripted binary audio plus `Flushed` in response to `Flush`,
//! scripted `Error` replies, and `Close` bookkeeping.

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};

/// How a mock connection responds to synthesis requests.
pub enum MockScript {
    /// Reply to `Flush` with `count` binary chunks of `size` bytes, then
    /// `Flushed`.
    Chunks { count: usize, size: usize },
    /// Reply to `Speak` with a provider error.
    Fail { message: String },
    /// Fail the first connection, then behave like `Chunks`.
    FailFirstConnection {
        message: String,
        count: usize,
        size: usize,
    },
    /// Accept everything, send nothing back.
    Silent,
}

/// Shared state observed by tests.
pub struct SpeakMockState {
    pub script: MockScript,
    pub connections: AtomicU64,
    pub close_messages: AtomicU64,
    /// Query string of the most recent WebSocket handshake.
    pub last_query: Mutex<Option<String>>,
}

impl SpeakMockState {
    pub fn new(script: MockScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            connections: AtomicU64::new(0),
            close_messages: AtomicU64::new(0),
            last_query: Mutex::new(None),
        })
    }
}

/// Bind an ephemeral port and serve mock connections in the background.
pub async fn spawn_speak_mock(state: Arc<SpeakMockState>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock listener");
    let addr = listener.local_addr().expect("mock local addr");

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let state = state.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, state).await {
                    eprintln!("Speak mock connection error: {e}");
                }
            });
        }
    });

    addr
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<SpeakMockState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let conn_index = state.connections.fetch_add(1, Ordering::SeqCst);

    let query_state = state.clone();
    let callback = move |req: &Request, resp: Response| {
        *query_state.last_query.lock().unwrap() = req.uri().query().map(|q| q.to_string());
        Ok(resp)
    };

    let ws_stream = accept_hdr_async(stream, callback).await?;
    let (mut write, mut read) = ws_stream.split();

    // Initial metadata, Deepgram style
    let metadata = json!({
        "type": "Metadata",
        "request_id": format!("mock-req-{conn_index}"),
    });
    write
        .send(Message::Text(metadata.to_string().into()))
        .await?;

    let fail_this_connection = match &state.script {
        MockScript::Fail { .. } => true,
        MockScript::FailFirstConnection { .. } => conn_index == 0,
        _ => false,
    };

    while let Some(msg) = read.next().await {
        match msg? {
            Message::Text(text) => {
                let value: Value = serde_json::from_str(&text)?;
                match value.get("type").and_then(|t| t.as_str()) {
                    Some("Speak") => {
                        if fail_this_connection {
                            let message = match &state.script {
                                MockScript::Fail { message }
                                | MockScript::FailFirstConnection { message, .. } => {
                                    message.clone()
                                }
                                _ => unreachable!(),
                            };
                            let error = json!({ "type": "Error", "message": message });
                            write.send(Message::Text(error.to_string().into())).await?;
                        }
                    }
                    Some("Flush") => {
                        let chunks = match &state.script {
                            MockScript::Chunks { count, size } => Some((*count, *size)),
                            MockScript::FailFirstConnection { count, size, .. }
                                if !fail_this_connection =>
                            {
                                Some((*count, *size))
                            }
                            _ => None,
                        };
                        if let Some((count, size)) = chunks {
                            for _ in 0..count {
                                write.send(Message::Binary(vec![0u8; size].into())).await?;
                            }
                            let flushed = json!({ "type": "Flushed", "sequence_id": 0 });
                            write
                                .send(Message::Text(flushed.to_string().into()))
                                .await?;
                        }
                    }
                    Some("Close") => {
                        state.close_messages.fetch_add(1, Ordering::SeqCst);
                        break;
                    }
                    _ => {}
                }
            }
            Message::Close(_) => break,
            Message::Ping(data) => write.send(Message::Pong(data)).await?,
            _ => {}
        }
    }

    Ok(())
}
