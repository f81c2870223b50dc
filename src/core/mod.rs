pub mod realtime;
pub mod relay;

pub use realtime::{
    BoxedUpstream, ConnectError, DecodeError, OpenAIRealtime, SessionConfig, TransportError,
    UpstreamClient, UpstreamEvent,
};
pub use relay::{RelayError, RelayOptions, RelaySession, SessionState, SessionSummary};
