//! WebSocket server mimicking the realtime API.
//!
//! Records the handshake and every frame the client sends, and replies with
//! scripted server events.

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        Message,
        handshake::server::{ErrorResponse, Request, Response},
        http::StatusCode,
    },
};

/// What the mock does on each connection.
#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    /// Reject the handshake with this status
    pub reject_with: Option<u16>,
    /// Frames sent right after the negotiation frame arrives
    pub after_negotiation: Vec<String>,
    /// Frames sent after each `input_audio_buffer.commit`
    pub after_commit: Vec<String>,
    /// Close the socket once `after_negotiation` is sent
    pub close_after_negotiation: bool,
    /// Keep the socket open but stop reading once `after_negotiation` is sent
    pub stall_after_negotiation: bool,
}

/// Everything the mock observed.
#[derive(Debug, Default)]
pub struct MockServerState {
    pub authorization: Mutex<Vec<String>>,
    pub queries: Mutex<Vec<String>>,
    pub frames: Mutex<Vec<Value>>,
    pub connections: AtomicUsize,
    /// Connection handlers that have returned
    pub finished: AtomicUsize,
}

impl MockServerState {
    pub fn frames(&self) -> Vec<Value> {
        self.frames.lock().clone()
    }

    pub fn frame_types(&self) -> Vec<String> {
        self.frames
            .lock()
            .iter()
            .filter_map(|frame| frame["type"].as_str().map(str::to_string))
            .collect()
    }
}

pub struct MockRealtimeServer {
    pub addr: SocketAddr,
    pub state: Arc<MockServerState>,
    handle: JoinHandle<()>,
}

impl MockRealtimeServer {
    pub async fn start(behavior: MockBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockServerState::default());

        let accept_state = state.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = accept_state.clone();
                let behavior = behavior.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(stream, state.clone(), behavior).await;
                    state.finished.fetch_add(1, Ordering::Relaxed);
                });
            }
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    /// Base URL to configure on the client (no query string).
    pub fn url(&self) -> String {
        format!("ws://{}/v1/realtime", self.addr)
    }
}

impl Drop for MockRealtimeServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<MockServerState>,
    behavior: MockBehavior,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let handshake_state = state.clone();
    let reject_with = behavior.reject_with;
    let callback = move |request: &Request, response: Response| {
        if let Some(value) = request
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
        {
            handshake_state.authorization.lock().push(value.to_string());
        }
        handshake_state
            .queries
            .lock()
            .push(request.uri().query().unwrap_or_default().to_string());

        match reject_with {
            Some(code) => {
                let mut rejection = ErrorResponse::new(Some("rejected".to_string()));
                *rejection.status_mut() =
                    StatusCode::from_u16(code).unwrap_or(StatusCode::UNAUTHORIZED);
                Err(rejection)
            }
            None => Ok(response),
        }
    };

    let ws_stream = accept_hdr_async(stream, callback).await?;
    state.connections.fetch_add(1, Ordering::Relaxed);
    let (mut write, mut read) = ws_stream.split();

    while let Some(msg) = read.next().await {
        match msg? {
            Message::Text(text) => {
                let frame: Value = serde_json::from_str(text.as_str())?;
                let frame_type = frame["type"].as_str().unwrap_or_default().to_string();
                state.frames.lock().push(frame);

                match frame_type.as_str() {
                    "session.update" => {
                        for event in &behavior.after_negotiation {
                            write.send(Message::Text(event.clone().into())).await?;
                        }
                        if behavior.close_after_negotiation {
                            write.send(Message::Close(None)).await?;
                            break;
                        }
                        if behavior.stall_after_negotiation {
                            // Both halves stay alive in this frame
                            std::future::pending::<()>().await;
                        }
                    }
                    "input_audio_buffer.commit" => {
                        for event in &behavior.after_commit {
                            write.send(Message::Text(event.clone().into())).await?;
                        }
                    }
                    _ => {}
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    Ok(())
}
