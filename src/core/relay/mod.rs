//! Duplex voice relay between a client socket and an upstream speech backend.
//!
//! - [`ClientLink`]: client frames to upstream sends, with the commit protocol
//! - [`EventForwarder`]: upstream events to client envelopes
//! - [`RelaySession`]: connect, run both pipelines, tear down once

mod client_link;
mod error;
mod forwarder;
mod messages;
mod session;

pub use client_link::{ClientLink, LinkExit};
pub use error::RelayError;
pub use forwarder::{EventForwarder, ForwarderExit};
pub use messages::{
    CONNECT_FAILED_MESSAGE, CONNECTED_MESSAGE, ClientEnvelope, ClientFrame, ClientMessage,
    IDLE_TIMEOUT_MESSAGE, INTERRUPTED_MESSAGE, UPSTREAM_LOST_MESSAGE,
};
pub use session::{
    CloseReason, DEFAULT_AUDIO_COMPLETE_DELAY, DEFAULT_MAX_AUDIO_CHUNK_BYTES, RelayOptions,
    RelaySession, SessionState, SessionSummary,
};
