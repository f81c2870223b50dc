//! Relay session lifecycle.
//!
//! A [`RelaySession`] owns one client socket and one upstream client. It
//! connects upstream, runs the two pipelines concurrently, and tears
//! everything down exactly once when either pipeline stops.

use std::fmt;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::client_link::{ClientLink, LinkExit};
use super::error::RelayError;
use super::forwarder::{EventForwarder, ForwarderExit};
use super::messages::{ClientEnvelope, ClientFrame};
use crate::core::realtime::{BoxedUpstream, SessionConfig, TransportError};

/// Default cap on one decoded client audio chunk (1 MiB).
pub const DEFAULT_MAX_AUDIO_CHUNK_BYTES: usize = 1024 * 1024;

/// Default pause before forwarding `audio_complete`.
pub const DEFAULT_AUDIO_COMPLETE_DELAY: Duration = Duration::from_millis(500);

/// Bound on each best-effort teardown step.
const TEARDOWN_STEP_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle state of a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Negotiating,
    Active,
    Closing,
    Closed,
}

impl SessionState {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Negotiating)
                | (Connecting, Closing)
                | (Negotiating, Active)
                | (Negotiating, Closing)
                | (Active, Closing)
                | (Closing, Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Negotiating => "negotiating",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Per-session relay tunables.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub max_audio_chunk_bytes: usize,
    pub audio_complete_delay: Duration,
    /// `None` disables the client idle timeout
    pub idle_timeout: Option<Duration>,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            max_audio_chunk_bytes: DEFAULT_MAX_AUDIO_CHUNK_BYTES,
            audio_complete_delay: DEFAULT_AUDIO_COMPLETE_DELAY,
            idle_timeout: None,
        }
    }
}

/// Why a session ended.
#[derive(Debug)]
pub enum CloseReason {
    /// Client sent a close frame or its stream ended
    ClientDisconnected,
    /// A write to the client failed
    ClientGone,
    Fault(RelayError),
}

/// Outcome of one session, returned by [`RelaySession::run`].
#[derive(Debug)]
pub struct SessionSummary {
    pub id: String,
    pub final_state: SessionState,
    pub reached_active: bool,
    pub close_reason: CloseReason,
    pub chunks_forwarded: u64,
    pub commits: u64,
    pub envelopes_forwarded: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    chunks_forwarded: u64,
    commits: u64,
    envelopes_forwarded: u64,
}

pub struct RelaySession {
    id: String,
    state: SessionState,
    config: SessionConfig,
    upstream: BoxedUpstream,
    options: RelayOptions,
    reached_active: bool,
}

impl RelaySession {
    pub fn new(config: SessionConfig, upstream: BoxedUpstream, options: RelayOptions) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            state: SessionState::Idle,
            config,
            upstream,
            options,
            reached_active: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition_to(next) {
            debug!(from = %self.state, to = %next, "Ignoring invalid state transition");
            return false;
        }
        debug!(from = %self.state, to = %next, "Session state transition");
        self.state = next;
        if next == SessionState::Active {
            self.reached_active = true;
        }
        true
    }

    /// Drive the session to completion.
    ///
    /// `inbound` yields client frames, `outbound` accepts frames for the
    /// client. Both belong to the same client socket.
    #[instrument(skip_all, fields(session_id = %self.id))]
    pub async fn run<I, O>(mut self, mut inbound: I, mut outbound: O) -> SessionSummary
    where
        I: Stream<Item = Result<ClientFrame, TransportError>> + Unpin + Send,
        O: Sink<ClientFrame> + Unpin + Send,
    {
        info!("Relay session started");
        self.transition(SessionState::Connecting);

        if let Err(e) = self.upstream.connect(&self.config).await {
            error!("Failed to connect upstream: {}", e);
            let reason = CloseReason::Fault(RelayError::Connect(e));
            return self
                .teardown(&mut outbound, reason, true, Counters::default())
                .await;
        }

        self.transition(SessionState::Negotiating);

        let events = match self.upstream.listen_for_events() {
            Ok(events) => events,
            Err(e) => {
                error!("Upstream event stream unavailable: {}", e);
                let reason = CloseReason::Fault(RelayError::EventStream(e));
                return self
                    .teardown(&mut outbound, reason, true, Counters::default())
                    .await;
            }
        };

        self.transition(SessionState::Active);
        info!(model = %self.config.model, voice = %self.config.voice, "Relay session active");

        let mut link = ClientLink::new(
            self.options.max_audio_chunk_bytes,
            self.options.idle_timeout,
        );
        let mut forwarder = EventForwarder::new(self.options.audio_complete_delay);
        let token = CancellationToken::new();

        let (link_exit, forwarder_exit) = {
            let upstream = self.upstream.as_ref();

            let client_pipeline = async {
                let exit = tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    exit = link.run(&mut inbound, upstream) => Some(exit),
                };
                token.cancel();
                exit
            };

            let upstream_pipeline = async {
                let exit = tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    exit = forwarder.run(events, &mut outbound) => Some(exit),
                };
                token.cancel();
                exit
            };

            tokio::join!(client_pipeline, upstream_pipeline)
        };

        let (reason, notify) = match (link_exit, forwarder_exit) {
            (Some(LinkExit::ClientClosed), _) => (CloseReason::ClientDisconnected, false),
            (Some(LinkExit::Failed(e)), _) => {
                warn!("Client pipeline failed: {}", e);
                (CloseReason::Fault(e), true)
            }
            (None, Some(ForwarderExit::ClientGone)) => (CloseReason::ClientGone, false),
            (None, Some(ForwarderExit::UpstreamEnded { error_forwarded })) => {
                warn!("Upstream event stream ended");
                (CloseReason::Fault(RelayError::UpstreamClosed), !error_forwarded)
            }
            (None, None) => (CloseReason::ClientDisconnected, false),
        };

        let counters = Counters {
            chunks_forwarded: link.chunks_forwarded(),
            commits: link.commits(),
            envelopes_forwarded: forwarder.forwarded(),
        };
        self.teardown(&mut outbound, reason, notify, counters).await
    }

    /// Close both sides. Each step is best effort and time-bounded.
    async fn teardown<O>(
        &mut self,
        outbound: &mut O,
        reason: CloseReason,
        notify: bool,
        counters: Counters,
    ) -> SessionSummary
    where
        O: Sink<ClientFrame> + Unpin,
    {
        if self.transition(SessionState::Closing) {
            match tokio::time::timeout(TEARDOWN_STEP_TIMEOUT, self.upstream.disconnect()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Upstream disconnect failed: {}", e),
                Err(_) => warn!("Upstream disconnect timed out"),
            }

            if notify {
                if let CloseReason::Fault(e) = &reason {
                    match ClientEnvelope::error(e.client_message()).to_frame() {
                        Ok(frame) => {
                            let sent =
                                tokio::time::timeout(TEARDOWN_STEP_TIMEOUT, outbound.send(frame))
                                    .await;
                            if !matches!(sent, Ok(Ok(()))) {
                                debug!("Could not deliver error envelope to client");
                            }
                        }
                        Err(e) => warn!("Failed to serialize error envelope: {}", e),
                    }
                }
            }

            let closed = tokio::time::timeout(TEARDOWN_STEP_TIMEOUT, async {
                outbound.send(ClientFrame::Close).await?;
                outbound.close().await
            })
            .await;
            if !matches!(closed, Ok(Ok(()))) {
                debug!("Client socket already closed");
            }

            self.transition(SessionState::Closed);
        }

        let summary = SessionSummary {
            id: self.id.clone(),
            final_state: self.state,
            reached_active: self.reached_active,
            close_reason: reason,
            chunks_forwarded: counters.chunks_forwarded,
            commits: counters.commits,
            envelopes_forwarded: counters.envelopes_forwarded,
        };

        info!(
            final_state = %summary.final_state,
            reached_active = summary.reached_active,
            close_reason = ?summary.close_reason,
            chunks = summary.chunks_forwarded,
            commits = summary.commits,
            forwarded = summary.envelopes_forwarded,
            "Relay session ended"
        );

        summary
    }
}
