//! Mock upstreams for relay tests
//!
//! - `upstream_mock`: in-process `UpstreamClient` that records every call
//! - `realtime_server_mock`: WebSocket server speaking the realtime wire
//!   protocol on an ephemeral port

// Each test binary uses a different subset of the helpers
#![allow(dead_code)]

pub mod realtime_server_mock;
pub mod upstream_mock;

use std::future::Future;
use std::time::Duration;

/// Poll `check` until it holds or `limit` elapses.
pub async fn wait_until<F>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Await `future` or panic after `limit`.
pub async fn within<T>(limit: Duration, future: impl Future<Output = T>) -> T {
    tokio::time::timeout(limit, future)
        .await
        .expect("operation timed out")
}
