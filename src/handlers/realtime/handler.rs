//! Relay WebSocket handler
//!
//! Adapts the axum socket to the transport-neutral frames the relay core
//! works with, then hands both halves to a [`RelaySession`].

use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt, future};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::info;

use crate::core::realtime::TransportError;
use crate::core::relay::{ClientFrame, RelaySession};
use crate::middleware::{ClientIp, ConnectionSlot};
use crate::state::AppState;

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

impl From<Message> for ClientFrame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => ClientFrame::Text(text.as_str().to_owned()),
            Message::Binary(data) => ClientFrame::Binary(data),
            Message::Ping(_) => ClientFrame::Ping,
            Message::Pong(_) => ClientFrame::Pong,
            Message::Close(_) => ClientFrame::Close,
        }
    }
}

impl From<ClientFrame> for Message {
    fn from(frame: ClientFrame) -> Self {
        match frame {
            ClientFrame::Text(text) => Message::Text(text.into()),
            ClientFrame::Binary(data) => Message::Binary(data),
            ClientFrame::Ping => Message::Ping(Bytes::new()),
            ClientFrame::Pong => Message::Pong(Bytes::new()),
            ClientFrame::Close => Message::Close(None),
        }
    }
}

/// Relay WebSocket handler
///
/// Upgrades the connection and runs one relay session on it. The
/// connection slot taken by the limit middleware is held until the
/// session ends.
pub async fn realtime_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    client_ip: Option<Extension<ClientIp>>,
    slot: Option<Extension<ConnectionSlot>>,
) -> Response {
    let client_ip = client_ip.map(|Extension(ClientIp(ip))| ip);
    let slot = slot.map(|Extension(slot)| slot);
    info!(client_ip = ?client_ip, "Relay WebSocket upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_relay_socket(socket, state, client_ip, slot))
}

async fn handle_relay_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    client_ip: Option<IpAddr>,
    slot: Option<ConnectionSlot>,
) {
    let _active = state.track_session();

    let (sender, receiver) = socket.split();
    let inbound = receiver.map(|result| {
        result
            .map(ClientFrame::from)
            .map_err(|e| TransportError::WebSocket(e.to_string()))
    });
    let outbound =
        sender.with(|frame: ClientFrame| future::ready(Ok::<_, axum::Error>(Message::from(frame))));

    let session = RelaySession::new(
        state.session_config(),
        state.create_upstream(),
        state.relay_options(),
    );
    info!(client_ip = ?client_ip, session_id = %session.id(), "Relay WebSocket connection established");

    let summary = session.run(inbound, outbound).await;

    drop(slot);
    info!(
        client_ip = ?client_ip,
        session_id = %summary.id,
        active_connections = state.ws_connection_count(),
        "Relay WebSocket connection finished"
    );
}
