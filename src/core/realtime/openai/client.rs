//! OpenAI Realtime API client implementation.
//!
//! This module provides [`OpenAIRealtime`], the [`UpstreamClient`] backed by
//! OpenAI's WebSocket Realtime API.
//!
//! # API Reference
//!
//! - Endpoint: `wss://api.openai.com/v1/realtime?model=<model>`
//! - Protocol: WebSocket with JSON events
//! - Audio: base64 inside `input_audio_buffer.append` / `response.output_audio.delta`
//!
//! # Example
//!
//! ```rust,ignore
//! use voice_relay::core::realtime::{OpenAIRealtime, OpenAIRealtimeConfig, SessionConfig, UpstreamClient};
//!
//! let client = OpenAIRealtime::new(OpenAIRealtimeConfig::new("sk-..."));
//! client.connect(&SessionConfig::default()).await?;
//! let mut events = client.listen_for_events()?;
//! client.send_audio(chunk).await?;
//! ```
//!
//! A client is single-use: once `disconnect` runs, `connect` is refused and a
//! new client has to be created.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use http::HeaderValue;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::task::AbortOnDropHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use super::config::OpenAIRealtimeConfig;
use super::messages::{ClientEvent, SessionPayload, parse_server_event};
use crate::core::realtime::base::{
    ConnectError, DecodeError, SessionConfig, TransportError, UpstreamClient, UpstreamEvent,
    UpstreamEventStream,
};

/// Channel capacity for WebSocket message sending.
const WS_CHANNEL_CAPACITY: usize = 256;

/// Upper bound on queueing the close frame during `disconnect`.
const CLOSE_QUEUE_TIMEOUT: Duration = Duration::from_millis(500);

/// Upper bound on waiting for the writer to flush before aborting it.
///
/// Together with [`CLOSE_QUEUE_TIMEOUT`] this stays under the relay's
/// per-step teardown bound.
const WRITER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Role used for scripted conversation items.
const SCRIPTED_ITEM_ROLE: &str = "system";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

// =============================================================================
// OpenAI Realtime Client
// =============================================================================

/// OpenAI Realtime API client.
///
/// Outbound events go through a bounded channel to a writer task that owns
/// the socket sink, so sends from any task keep call order. The read half is
/// parked until [`UpstreamClient::listen_for_events`] takes it.
///
/// The writer task is held through an [`AbortOnDropHandle`], so it cannot
/// outlive the client even when `disconnect` is cancelled part way.
pub struct OpenAIRealtime {
    config: OpenAIRealtimeConfig,
    /// Shared with the event stream, which clears it when the socket ends
    connected: Arc<AtomicBool>,
    /// Set by the first `disconnect`
    closed: AtomicBool,
    ws_sender: Mutex<Option<mpsc::Sender<Message>>>,
    ws_reader: Mutex<Option<WsReader>>,
    writer_handle: Mutex<Option<AbortOnDropHandle<()>>>,
}

impl OpenAIRealtime {
    pub fn new(config: OpenAIRealtimeConfig) -> Self {
        Self {
            config,
            connected: Arc::new(AtomicBool::new(false)),
            closed: AtomicBool::new(false),
            ws_sender: Mutex::new(None),
            ws_reader: Mutex::new(None),
            writer_handle: Mutex::new(None),
        }
    }

    /// Get the client configuration.
    pub fn config(&self) -> &OpenAIRealtimeConfig {
        &self.config
    }

    /// Build the WebSocket URL with the model query parameter.
    fn build_ws_url(&self, model: &str) -> Result<Url, ConnectError> {
        let mut url = Url::parse(&self.config.url).map_err(|e| {
            ConnectError::InvalidConfiguration(format!("invalid realtime URL: {e}"))
        })?;
        url.query_pairs_mut().append_pair("model", model);
        Ok(url)
    }

    /// Build the upgrade request carrying the bearer credential.
    fn build_request(&self, url: &Url) -> Result<http::Request<()>, ConnectError> {
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ConnectError::InvalidConfiguration(e.to_string()))?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|_| {
                ConnectError::InvalidConfiguration("API key is not a valid header value".into())
            })?;
        auth.set_sensitive(true);
        request
            .headers_mut()
            .insert(http::header::AUTHORIZATION, auth);

        Ok(request)
    }

    /// Map a handshake failure onto the connect error taxonomy.
    fn map_handshake_error(err: tungstenite::Error) -> ConnectError {
        match err {
            tungstenite::Error::Http(response)
                if matches!(response.status().as_u16(), 401 | 403) =>
            {
                ConnectError::Authentication(format!(
                    "upstream rejected credentials with status {}",
                    response.status()
                ))
            }
            tungstenite::Error::Http(response) => ConnectError::Connection(format!(
                "upstream refused upgrade with status {}",
                response.status()
            )),
            other => ConnectError::Connection(other.to_string()),
        }
    }

    async fn send_event(&self, event: ClientEvent) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::NotConnected);
        }

        let json = serde_json::to_string(&event)
            .map_err(|e| TransportError::Serialization(e.to_string()))?;

        // Clone the sender out so the lock is not held across the await.
        let sender = self
            .ws_sender
            .lock()
            .clone()
            .ok_or(TransportError::NotConnected)?;

        sender
            .send(Message::Text(json.into()))
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Writer task: drain the channel into the sink until a close frame or error.
    async fn run_writer(mut sink: WsSink, mut rx: mpsc::Receiver<Message>) {
        while let Some(message) = rx.recv().await {
            let is_close = matches!(message, Message::Close(_));
            if let Err(e) = sink.send(message).await {
                warn!("Failed to send WebSocket message: {}", e);
                break;
            }
            if is_close {
                break;
            }
        }
        let _ = sink.close().await;
        debug!("OpenAI Realtime writer task finished");
    }
}

/// Decode one inbound data frame.
fn decode_frame(message: Message) -> Option<Result<UpstreamEvent, DecodeError>> {
    match message {
        Message::Text(text) => Some(parse_server_event(text.as_str())),
        Message::Binary(data) => Some(
            std::str::from_utf8(&data)
                .map_err(|e| DecodeError::InvalidJson(format!("binary frame is not UTF-8: {e}")))
                .and_then(parse_server_event),
        ),
        // Control frames are answered by tungstenite itself.
        _ => None,
    }
}

#[async_trait]
impl UpstreamClient for OpenAIRealtime {
    async fn connect(&self, config: &SessionConfig) -> Result<(), ConnectError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ConnectError::Connection(
                "client has been disconnected".to_string(),
            ));
        }
        if self.connected.load(Ordering::Acquire) {
            return Err(ConnectError::AlreadyConnected);
        }
        if self.config.api_key.trim().is_empty() {
            return Err(ConnectError::Authentication(
                "OpenAI API key is not configured".to_string(),
            ));
        }

        let url = self.build_ws_url(&config.model)?;
        let request = self.build_request(&url)?;

        let timeout = self.config.connect_timeout;
        let (ws_stream, _response) =
            tokio::time::timeout(timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| ConnectError::Timeout(timeout.as_secs()))?
                .map_err(Self::map_handshake_error)?;

        info!(model = %config.model, "Connected to OpenAI Realtime API");

        let (mut ws_sink, ws_reader) = ws_stream.split();

        // Negotiation goes out before any audio can be queued.
        let negotiation = ClientEvent::SessionUpdate {
            session: SessionPayload::from(config),
        };
        let json = serde_json::to_string(&negotiation)
            .map_err(|e| ConnectError::Negotiation(e.to_string()))?;
        ws_sink
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| ConnectError::Negotiation(e.to_string()))?;

        debug!(voice = %config.voice, vad = config.vad.enabled, "Sent session.update");

        let (tx, rx) = mpsc::channel::<Message>(WS_CHANNEL_CAPACITY);
        let handle = AbortOnDropHandle::new(tokio::spawn(Self::run_writer(ws_sink, rx)));

        *self.ws_sender.lock() = Some(tx);
        *self.ws_reader.lock() = Some(ws_reader);
        // A previous socket whose stream already ended still has a writer.
        if let Some(stale) = self.writer_handle.lock().replace(handle) {
            debug!("Aborting writer left over from the previous socket");
            stale.abort();
        }
        self.connected.store(true, Ordering::Release);

        Ok(())
    }

    async fn send_audio(&self, chunk: Bytes) -> Result<(), TransportError> {
        self.send_event(ClientEvent::audio_append(&chunk)).await
    }

    async fn commit_audio(&self) -> Result<(), TransportError> {
        self.send_event(ClientEvent::InputAudioBufferCommit).await
    }

    fn listen_for_events(&self) -> Result<UpstreamEventStream, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::NotConnected);
        }

        let mut reader = match self.ws_reader.lock().take() {
            Some(reader) => reader,
            None if self.connected.load(Ordering::Acquire) => {
                return Err(TransportError::StreamTaken);
            }
            None => return Err(TransportError::NotConnected),
        };
        let connected = Arc::clone(&self.connected);

        let stream = async_stream::stream! {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "OpenAI Realtime socket closed by server");
                        break;
                    }
                    Ok(message) => match decode_frame(message) {
                        Some(Ok(event)) => yield event,
                        Some(Err(e)) => {
                            warn!("Failed to decode server event: {}", e);
                            yield UpstreamEvent::Error { message: e.to_string() };
                        }
                        None => {}
                    },
                    Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                        break;
                    }
                    Err(e) => {
                        warn!("OpenAI Realtime read error: {}", e);
                        yield UpstreamEvent::Error { message: format!("WebSocket error: {e}") };
                        break;
                    }
                }
            }
            connected.store(false, Ordering::Release);
        };

        Ok(Box::pin(stream))
    }

    async fn create_conversation_item(&self, text: &str) -> Result<(), TransportError> {
        self.send_event(ClientEvent::text_item(SCRIPTED_ITEM_ROLE, text))
            .await
    }

    async fn trigger_response(&self) -> Result<(), TransportError> {
        self.send_event(ClientEvent::ResponseCreate).await
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.connected.store(false, Ordering::Release);

        let sender = self.ws_sender.lock().take();
        // Drop an unclaimed read half right away.
        drop(self.ws_reader.lock().take());
        let handle = self.writer_handle.lock().take();

        if let Some(sender) = sender {
            match tokio::time::timeout(CLOSE_QUEUE_TIMEOUT, sender.send(Message::Close(None))).await
            {
                Ok(Ok(())) => {}
                Ok(Err(_)) => debug!("Writer already stopped before close frame"),
                Err(_) => warn!("Timed out queueing close frame"),
            }
        }

        if let Some(mut handle) = handle {
            if tokio::time::timeout(WRITER_JOIN_TIMEOUT, &mut handle)
                .await
                .is_err()
            {
                warn!("Writer task did not finish in time, aborting");
                handle.abort();
            }
        }

        info!("Disconnected from OpenAI Realtime API");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire) && !self.closed.load(Ordering::Acquire)
    }
}
