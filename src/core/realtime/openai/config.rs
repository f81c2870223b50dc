//! OpenAI Realtime API configuration types.
//!
//! This module contains configuration types for OpenAI's Realtime API:
//! - Endpoint and default model constants
//! - Voice selection
//! - Connection settings (credentials, endpoint, connect timeout)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// OpenAI Realtime API WebSocket endpoint.
pub const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Default audio sample rate for OpenAI Realtime API.
pub const OPENAI_REALTIME_SAMPLE_RATE: u32 = 24000;

/// Default realtime model.
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-realtime";

/// Default voice for relay sessions.
pub const DEFAULT_REALTIME_VOICE: &str = "alloy";

/// Default input transcription model.
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "gpt-4o-transcribe";

/// Default input transcription language.
pub const DEFAULT_TRANSCRIPTION_LANGUAGE: &str = "en";

/// Default time allowed for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// Voices
// =============================================================================

/// Voices offered by the Realtime API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenAIRealtimeVoice {
    #[default]
    Alloy,
    Ash,
    Ballad,
    Cedar,
    Coral,
    Echo,
    Marin,
    Sage,
    Shimmer,
    Verse,
}

impl OpenAIRealtimeVoice {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Ash => "ash",
            Self::Ballad => "ballad",
            Self::Cedar => "cedar",
            Self::Coral => "coral",
            Self::Echo => "echo",
            Self::Marin => "marin",
            Self::Sage => "sage",
            Self::Shimmer => "shimmer",
            Self::Verse => "verse",
        }
    }

    /// Parse a voice name, returning `None` for voices this build does not know.
    pub fn parse(s: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|voice| voice.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// Get all available voices.
    pub fn all() -> &'static [OpenAIRealtimeVoice] {
        &[
            Self::Alloy,
            Self::Ash,
            Self::Ballad,
            Self::Cedar,
            Self::Coral,
            Self::Echo,
            Self::Marin,
            Self::Sage,
            Self::Shimmer,
            Self::Verse,
        ]
    }
}

impl fmt::Display for OpenAIRealtimeVoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Connection Settings
// =============================================================================

/// Credentials and endpoint for one OpenAI Realtime client.
#[derive(Clone)]
pub struct OpenAIRealtimeConfig {
    /// Bearer token sent in the `Authorization` header
    pub api_key: String,
    /// Base WebSocket URL; the model is appended as a query parameter
    pub url: String,
    /// Upper bound on the WebSocket handshake
    pub connect_timeout: Duration,
}

impl OpenAIRealtimeConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            url: OPENAI_REALTIME_URL.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Point the client at a different endpoint (proxies, local mocks).
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl fmt::Debug for OpenAIRealtimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAIRealtimeConfig")
            .field("api_key", &"[REDACTED]")
            .field("url", &self.url)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl Drop for OpenAIRealtimeConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.api_key.zeroize();
    }
}
