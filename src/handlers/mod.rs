//! HTTP and WebSocket request handlers
//!
//! - `api` - Health endpoints
//! - `realtime` - Relay WebSocket bridged to the upstream speech backend

pub mod api;
pub mod realtime;

pub use realtime::realtime_handler;
