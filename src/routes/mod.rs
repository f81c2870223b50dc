pub mod api;
pub mod realtime;

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// All application routes with state attached.
///
/// Cross-cutting layers (CORS, rate limiting, security headers) are added
/// by the binary.
pub fn create_router(state: Arc<AppState>) -> Router {
    api::create_api_router()
        .merge(realtime::create_realtime_router(state.clone()))
        .with_state(state)
}
