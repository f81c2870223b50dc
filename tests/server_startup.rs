//! Server tests
//!
//! Health routes through `oneshot`, and full relay sessions through a bound
//! axum server, a tokio-tungstenite client and the mock realtime server.

mod mock_providers;

use axum::{body::Body, http::Request, http::StatusCode};
use base64::prelude::*;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tower::util::ServiceExt;

use mock_providers::realtime_server_mock::{MockBehavior, MockRealtimeServer};
use mock_providers::{wait_until, within};
use voice_relay::{ServerConfig, routes, state::AppState};

const STEP: Duration = Duration::from_secs(5);

type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn relay_config(upstream: &MockRealtimeServer) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.host = "127.0.0.1".to_string();
    config.openai_api_key = Some("sk-test".to_string());
    config.realtime.url = upstream.url();
    config.realtime.audio_complete_delay_ms = 0;
    config
}

async fn spawn_app(config: ServerConfig) -> (SocketAddr, Arc<AppState>) {
    let state = AppState::new(config).await;
    let app = routes::create_router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (addr, state)
}

async fn connect_client(addr: SocketAddr) -> ClientSocket {
    let (socket, _response) = within(STEP, connect_async(format!("ws://{addr}/realtime")))
        .await
        .unwrap();
    socket
}

/// Next JSON envelope, or `None` once the relay closes the socket.
async fn next_envelope(socket: &mut ClientSocket) -> Option<Value> {
    loop {
        match within(STEP, socket.next()).await {
            Some(Ok(Message::Text(text))) => return Some(serde_json::from_str(text.as_str()).unwrap()),
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => continue,
        }
    }
}

#[tokio::test]
async fn test_health_check_without_api_keys() {
    let state = AppState::new(ServerConfig::default()).await;
    let app = routes::create_router(state);

    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "running");
    assert_eq!(body["service"], "voice-relay");
}

#[tokio::test]
async fn test_health_status_reports_sessions() {
    let state = AppState::new(ServerConfig::default()).await;
    let app = routes::create_router(state);

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["active_sessions"], 0);
    assert_eq!(body["upstream_configured"], false);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let state = AppState::new(ServerConfig::default()).await;
    let app = routes::create_router(state);

    let request = Request::builder().uri("/voices").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_end_to_end_relay_turn() {
    let upstream = MockRealtimeServer::start(MockBehavior {
        after_negotiation: vec![r#"{"type":"session.created","session":{}}"#.to_string()],
        after_commit: vec![
            r#"{"type":"conversation.item.input_audio_transcription.completed","transcript":"hello"}"#
                .to_string(),
            r#"{"type":"response.output_audio_transcript.delta","delta":"Hi"}"#.to_string(),
            r#"{"type":"response.output_audio.delta","delta":"AAEC"}"#.to_string(),
            r#"{"type":"response.output_audio.done"}"#.to_string(),
            r#"{"type":"response.done","response":{}}"#.to_string(),
        ],
        ..Default::default()
    })
    .await;
    let (addr, state) = spawn_app(relay_config(&upstream)).await;

    let mut client = connect_client(addr).await;
    let established = next_envelope(&mut client).await.unwrap();
    assert_eq!(established["type"], "connection_established");
    assert_eq!(established["message"], "Connected to AI agent");
    assert_eq!(state.active_sessions(), 1);

    let chunk = serde_json::json!({
        "type": "audio_chunk",
        "data": BASE64_STANDARD.encode([9u8, 9, 9, 9]),
    });
    client
        .send(Message::Text(chunk.to_string().into()))
        .await
        .unwrap();
    client
        .send(Message::Binary(vec![8u8, 8].into()))
        .await
        .unwrap();
    client
        .send(Message::Text(r#"{"type":"audio_complete"}"#.to_string().into()))
        .await
        .unwrap();

    let mut kinds = Vec::new();
    for _ in 0..5 {
        let envelope = next_envelope(&mut client).await.unwrap();
        if envelope["type"] == "user_transcript" {
            assert_eq!(envelope["text"], "hello");
        }
        if envelope["type"] == "audio_delta" {
            assert_eq!(envelope["audio"], "AAEC");
        }
        kinds.push(envelope["type"].as_str().unwrap().to_string());
    }
    assert_eq!(
        kinds,
        vec![
            "user_transcript",
            "agent_transcript_delta",
            "audio_delta",
            "audio_complete",
            "response_complete",
        ]
    );

    let upstream_state = upstream.state.clone();
    assert_eq!(
        upstream_state.frame_types(),
        vec![
            "session.update",
            "input_audio_buffer.append",
            "input_audio_buffer.append",
            "input_audio_buffer.commit",
        ]
    );
    assert_eq!(upstream_state.frames()[1]["audio"], "CQkJCQ==");

    client.close(None).await.unwrap();
    assert!(wait_until(STEP, || state.active_sessions() == 0).await);
    assert!(wait_until(STEP, || state.ws_connection_count() == 0).await);
}

#[tokio::test]
async fn test_missing_api_key_sends_connect_error() {
    let upstream = MockRealtimeServer::start(MockBehavior::default()).await;
    let mut config = relay_config(&upstream);
    config.openai_api_key = None;
    let (addr, state) = spawn_app(config).await;

    let mut client = connect_client(addr).await;
    let envelope = next_envelope(&mut client).await.unwrap();
    assert_eq!(envelope["type"], "error");
    assert_eq!(envelope["message"], "Failed to connect to OpenAI Realtime API");
    assert!(next_envelope(&mut client).await.is_none());

    assert_eq!(upstream.state.connections.load(std::sync::atomic::Ordering::Relaxed), 0);
    assert!(wait_until(STEP, || state.ws_connection_count() == 0).await);
}

#[tokio::test]
async fn test_rejected_upstream_credentials_send_connect_error() {
    let upstream = MockRealtimeServer::start(MockBehavior {
        reject_with: Some(401),
        ..Default::default()
    })
    .await;
    let (addr, _state) = spawn_app(relay_config(&upstream)).await;

    let mut client = connect_client(addr).await;
    let envelope = next_envelope(&mut client).await.unwrap();
    assert_eq!(envelope["type"], "error");
    assert_eq!(envelope["message"], "Failed to connect to OpenAI Realtime API");
    assert!(next_envelope(&mut client).await.is_none());
}

#[tokio::test]
async fn test_upstream_close_reaches_client() {
    let upstream = MockRealtimeServer::start(MockBehavior {
        after_negotiation: vec![r#"{"type":"session.created","session":{}}"#.to_string()],
        close_after_negotiation: true,
        ..Default::default()
    })
    .await;
    let (addr, _state) = spawn_app(relay_config(&upstream)).await;

    let mut client = connect_client(addr).await;
    assert_eq!(
        next_envelope(&mut client).await.unwrap()["type"],
        "connection_established"
    );
    let envelope = next_envelope(&mut client).await.unwrap();
    assert_eq!(envelope["type"], "error");
    assert_eq!(envelope["message"], "Connection to AI agent lost");
    assert!(next_envelope(&mut client).await.is_none());
}

#[tokio::test]
async fn test_per_ip_limit_rejects_second_socket() {
    let upstream = MockRealtimeServer::start(MockBehavior::default()).await;
    let mut config = relay_config(&upstream);
    config.max_connections_per_ip = 1;
    let (addr, state) = spawn_app(config).await;

    let first = connect_client(addr).await;
    assert!(wait_until(STEP, || state.ws_connection_count() == 1).await);

    match connect_async(format!("ws://{addr}/realtime")).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        }
        other => panic!("expected 429 rejection, got {:?}", other.map(|_| ())),
    }

    drop(first);
    assert!(wait_until(STEP, || state.ws_connection_count() == 0).await);

    let _again = connect_client(addr).await;
    assert!(wait_until(STEP, || state.ws_connection_count() == 1).await);
}

#[tokio::test]
async fn test_global_limit_rejects_with_503() {
    let upstream = MockRealtimeServer::start(MockBehavior::default()).await;
    let mut config = relay_config(&upstream);
    config.max_websocket_connections = Some(1);
    let (addr, state) = spawn_app(config).await;

    let _first = connect_client(addr).await;
    assert!(wait_until(STEP, || state.ws_connection_count() == 1).await);

    match connect_async(format!("ws://{addr}/realtime")).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        }
        other => panic!("expected 503 rejection, got {:?}", other.map(|_| ())),
    }
}
