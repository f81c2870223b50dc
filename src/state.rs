//! Shared application state.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use thiserror::Error;

use crate::config::ServerConfig;
use crate::core::realtime::{BoxedUpstream, OpenAIRealtime, SessionConfig};
use crate::core::relay::RelayOptions;

/// Builds a fresh upstream client for each relay session.
pub type UpstreamFactory = Arc<dyn Fn(&ServerConfig) -> BoxedUpstream + Send + Sync>;

/// Reasons a new WebSocket connection is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectionLimitError {
    #[error("global WebSocket connection limit reached")]
    GlobalLimitReached,
    #[error("per-IP connection limit reached")]
    PerIpLimitReached,
}

/// Default upstream: the OpenAI Realtime client built from config.
pub fn create_upstream_client(config: &ServerConfig) -> BoxedUpstream {
    Box::new(OpenAIRealtime::new(config.upstream_config()))
}

/// Process-wide state shared by all handlers.
///
/// Constructed once in `main` and passed to the router; there is no global
/// instance.
pub struct AppState {
    pub config: ServerConfig,
    upstream_factory: UpstreamFactory,
    ws_connections: AtomicUsize,
    ip_connections: DashMap<IpAddr, u32>,
    active_sessions: AtomicUsize,
}

impl AppState {
    pub async fn new(config: ServerConfig) -> Arc<Self> {
        Self::with_upstream_factory(config, Arc::new(create_upstream_client))
    }

    /// Build state with a custom upstream factory (alternate backends, tests).
    pub fn with_upstream_factory(config: ServerConfig, factory: UpstreamFactory) -> Arc<Self> {
        Arc::new(Self {
            config,
            upstream_factory: factory,
            ws_connections: AtomicUsize::new(0),
            ip_connections: DashMap::new(),
            active_sessions: AtomicUsize::new(0),
        })
    }

    /// Create the upstream client for a new session.
    pub fn create_upstream(&self) -> BoxedUpstream {
        (self.upstream_factory)(&self.config)
    }

    pub fn session_config(&self) -> SessionConfig {
        self.config.realtime.session.clone()
    }

    pub fn relay_options(&self) -> RelayOptions {
        self.config.relay_options()
    }

    /// Reserve a connection slot for `ip`.
    ///
    /// The global counter is taken first and rolled back if the per-IP check
    /// fails.
    pub fn try_acquire_connection(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        match self.config.max_websocket_connections {
            Some(max) => {
                self.ws_connections
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                        (current < max).then_some(current + 1)
                    })
                    .map_err(|_| ConnectionLimitError::GlobalLimitReached)?;
            }
            None => {
                self.ws_connections.fetch_add(1, Ordering::AcqRel);
            }
        }

        let per_ip_max = self.config.max_connections_per_ip;
        let accepted = {
            let mut count = self.ip_connections.entry(ip).or_insert(0);
            if *count >= per_ip_max {
                false
            } else {
                *count += 1;
                true
            }
        };

        if !accepted {
            self.ws_connections.fetch_sub(1, Ordering::AcqRel);
            self.ip_connections.remove_if(&ip, |_, count| *count == 0);
            return Err(ConnectionLimitError::PerIpLimitReached);
        }

        Ok(())
    }

    /// Return a slot taken by `try_acquire_connection`.
    pub fn release_connection(&self, ip: IpAddr) {
        let _ = self
            .ws_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            });

        if let Some(mut count) = self.ip_connections.get_mut(&ip) {
            *count = count.saturating_sub(1);
        }
        self.ip_connections.remove_if(&ip, |_, count| *count == 0);
    }

    pub fn ws_connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::Acquire)
    }

    pub fn ip_connection_count(&self, ip: &IpAddr) -> u32 {
        self.ip_connections.get(ip).map(|count| *count).unwrap_or(0)
    }

    /// Relay sessions currently running.
    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Acquire)
    }

    /// Count a session as active until the returned guard drops.
    pub fn track_session(self: &Arc<Self>) -> SessionGuard {
        self.active_sessions.fetch_add(1, Ordering::AcqRel);
        SessionGuard {
            state: Arc::clone(self),
        }
    }
}

/// Decrements the active session count on drop.
pub struct SessionGuard {
    state: Arc<AppState>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.state.active_sessions.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A held connection slot. Released on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    state: Arc<AppState>,
    ip: IpAddr,
}

impl ConnectionPermit {
    /// Acquire a slot for `ip`, or report which limit refused it.
    pub fn acquire(state: &Arc<AppState>, ip: IpAddr) -> Result<Self, ConnectionLimitError> {
        state.try_acquire_connection(ip)?;
        Ok(Self {
            state: Arc::clone(state),
            ip,
        })
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        self.state.release_connection(self.ip);
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("ws_connections", &self.ws_connection_count())
            .field("active_sessions", &self.active_sessions())
            .finish_non_exhaustive()
    }
}
