//! Configuration module for the voice relay server
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//! The configuration is split into logical submodules:
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Applying YAML overrides on top of the environment
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use voice_relay::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::realtime::openai::{
    DEFAULT_CONNECT_TIMEOUT_SECS, OPENAI_REALTIME_URL, OpenAIRealtimeConfig,
};
use crate::core::realtime::SessionConfig;
use crate::core::relay::{DEFAULT_MAX_AUDIO_CHUNK_BYTES, RelayOptions};

mod env;
mod merge;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

/// Default `audio_complete` drain delay in milliseconds.
pub const DEFAULT_AUDIO_COMPLETE_DELAY_MS: u64 = 500;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn invalid_value(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Relay and upstream session settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeSettings {
    /// Upstream WebSocket base URL
    pub url: String,
    /// Negotiation parameters for every relay session
    pub session: SessionConfig,
    pub connect_timeout_seconds: u64,
    /// Pause before forwarding `audio_complete` to the client
    pub audio_complete_delay_ms: u64,
    /// Largest accepted decoded client audio chunk
    pub max_audio_chunk_bytes: usize,
    /// Client idle timeout; `None` disables it
    pub idle_timeout_seconds: Option<u64>,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            url: OPENAI_REALTIME_URL.to_string(),
            session: SessionConfig::default(),
            connect_timeout_seconds: DEFAULT_CONNECT_TIMEOUT_SECS,
            audio_complete_delay_ms: DEFAULT_AUDIO_COMPLETE_DELAY_MS,
            max_audio_chunk_bytes: DEFAULT_MAX_AUDIO_CHUNK_BYTES,
            idle_timeout_seconds: None,
        }
    }
}

/// Server configuration
///
/// Contains all configuration needed to run the relay server:
/// - Server settings (host, port, TLS)
/// - Upstream credentials and relay session settings
/// - Security settings (CORS, rate limiting, connection limits)
///
/// Never construct with struct-update syntax: the `Drop` impl forbids it.
/// Start from `ServerConfig::default()` and assign fields instead.
#[derive(Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    /// Lowers the default log level to `debug`
    pub debug: bool,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    /// OpenAI API key for the Realtime API
    pub openai_api_key: Option<String>,

    pub realtime: RealtimeSettings,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: "*"
    pub cors_allowed_origins: Option<String>,

    // Rate limiting configuration
    /// Maximum requests per second per IP address
    /// Default: 60
    pub rate_limit_requests_per_second: u32,
    /// Maximum burst size for rate limiting
    /// Default: 10
    pub rate_limit_burst_size: u32,

    // Connection limits
    /// Maximum concurrent WebSocket connections
    /// Default: None (unlimited)
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address
    /// Default: 100
    pub max_connections_per_ip: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            debug: false,
            tls: None,
            openai_api_key: None,
            realtime: RealtimeSettings::default(),
            cors_allowed_origins: Some("*".to_string()),
            rate_limit_requests_per_second: 60,
            rate_limit_burst_size: 10,
            max_websocket_connections: None,
            max_connections_per_ip: 100,
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("debug", &self.debug)
            .field("tls", &self.tls)
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("realtime", &self.realtime)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field(
                "rate_limit_requests_per_second",
                &self.rate_limit_requests_per_second,
            )
            .field("rate_limit_burst_size", &self.rate_limit_burst_size)
            .field("max_websocket_connections", &self.max_websocket_connections)
            .field("max_connections_per_ip", &self.max_connections_per_ip)
            .finish()
    }
}

/// Wipe the API key when the config is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables (after `.env`) and defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = merge::merge_config(None)?;
        validation::validate_server_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        // .env is loaded into the process environment by main.rs at startup.
        let yaml_config = YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate_server_config(&config)?;
        Ok(config)
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Whether an upstream API key is configured
    pub fn has_upstream_credentials(&self) -> bool {
        self.openai_api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }

    /// Connection settings for a new upstream client.
    ///
    /// A missing key yields an empty one; the client rejects it at connect
    /// time so the caller still gets an `error` envelope.
    pub fn upstream_config(&self) -> OpenAIRealtimeConfig {
        OpenAIRealtimeConfig::new(self.openai_api_key.clone().unwrap_or_default())
            .with_url(self.realtime.url.clone())
            .with_connect_timeout(Duration::from_secs(self.realtime.connect_timeout_seconds))
    }

    /// Relay tunables for a new session.
    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            max_audio_chunk_bytes: self.realtime.max_audio_chunk_bytes,
            audio_complete_delay: Duration::from_millis(self.realtime.audio_complete_delay_ms),
            idle_timeout: self.realtime.idle_timeout_seconds.map(Duration::from_secs),
        }
    }
}
