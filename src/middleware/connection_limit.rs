//! Connection limit middleware for the relay WebSocket endpoint
//!
//! Enforces the global WebSocket cap and the per-IP cap before the upgrade
//! reaches the handler. Accepted upgrades carry a [`ConnectionSlot`] that
//! frees the slot when the relay session drops it.
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use voice_relay::middleware::connection_limit_middleware;
//!
//! let app = Router::new()
//!     .route("/realtime", get(realtime_handler))
//!     .layer(axum::middleware::from_fn_with_state(
//!         state.clone(),
//!         connection_limit_middleware,
//!     ));
//! ```

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::state::{AppState, ConnectionLimitError, ConnectionPermit};

/// Client IP of the upgrade request, for logging in the handler.
#[derive(Clone, Copy, Debug)]
pub struct ClientIp(pub IpAddr);

/// Shared handle to the connection slot held for one accepted upgrade.
///
/// The slot is released when the last clone drops, so the handler moves it
/// into the socket task and keeps it for the session's lifetime.
#[derive(Clone, Debug)]
pub struct ConnectionSlot(pub Arc<ConnectionPermit>);

fn is_websocket_upgrade(request: &Request<Body>) -> bool {
    request
        .headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

/// Middleware that enforces connection limits for WebSocket upgrades.
///
/// Returns 503 when the global limit is reached and 429 when the caller's
/// IP is at its limit. Plain HTTP requests pass through untouched.
pub async fn connection_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if !is_websocket_upgrade(&request) {
        return next.run(request).await;
    }

    let client_ip = addr.ip();

    match ConnectionPermit::acquire(&state, client_ip) {
        Ok(permit) => {
            request.extensions_mut().insert(ClientIp(client_ip));
            request
                .extensions_mut()
                .insert(ConnectionSlot(Arc::new(permit)));
            next.run(request).await
        }
        Err(ConnectionLimitError::GlobalLimitReached) => {
            tracing::warn!(
                ip = %client_ip,
                active = state.ws_connection_count(),
                "Rejecting connection: global limit reached"
            );
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Server at capacity. Please try again later.",
            )
                .into_response()
        }
        Err(ConnectionLimitError::PerIpLimitReached) => {
            tracing::warn!(
                ip = %client_ip,
                "Rejecting connection: per-IP limit reached"
            );
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many connections from your IP address.",
            )
                .into_response()
        }
    }
}
