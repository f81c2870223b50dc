use std::time::Duration;

use thiserror::Error;

use super::messages::{CONNECT_FAILED_MESSAGE, IDLE_TIMEOUT_MESSAGE, UPSTREAM_LOST_MESSAGE};
use crate::core::realtime::{ConnectError, TransportError};

/// Session-ending fault detected by the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Upstream connect failed: {0}")]
    Connect(#[from] ConnectError),

    #[error("Upstream event stream unavailable: {0}")]
    EventStream(TransportError),

    #[error("Client read failed: {0}")]
    ClientRead(TransportError),

    #[error("Upstream send failed: {0}")]
    UpstreamSend(TransportError),

    #[error("Upstream connection closed")]
    UpstreamClosed,

    #[error("No client frame received for {0:?}")]
    IdleTimeout(Duration),
}

impl RelayError {
    /// Message carried by the `error` envelope sent before closing.
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::Connect(_) => CONNECT_FAILED_MESSAGE,
            Self::IdleTimeout(_) => IDLE_TIMEOUT_MESSAGE,
            Self::ClientRead(_) => "Client connection error",
            Self::EventStream(_) | Self::UpstreamSend(_) | Self::UpstreamClosed => {
                UPSTREAM_LOST_MESSAGE
            }
        }
    }
}
