//! Relay WebSocket route configuration

use axum::{Router, middleware, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::realtime::realtime_handler;
use crate::middleware::connection_limit_middleware;
use crate::state::AppState;
use std::sync::Arc;

/// Create the relay WebSocket router
///
/// # Endpoint
///
/// `GET /realtime` - WebSocket upgrade; one relay session per socket
///
/// Upgrades pass through the connection limit middleware, which needs
/// `ConnectInfo<SocketAddr>` from `into_make_service_with_connect_info`.
pub fn create_realtime_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/realtime", get(realtime_handler))
        .layer(middleware::from_fn_with_state(
            state,
            connection_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}
