//! Base traits and types for the upstream realtime speech backend.
//!
//! This module defines the seam between the relay and whichever hosted
//! speech-to-speech API sits behind it:
//!
//! - [`SessionConfig`]: negotiation parameters, consumed once at connect time
//! - [`UpstreamEvent`]: closed taxonomy of inbound backend events
//! - [`UpstreamClient`]: the send/receive contract a backend client implements
//!
//! # Audio Format
//!
//! Audio chunks are opaque bytes to the relay. The default negotiation asks
//! for PCM 16-bit signed little-endian at 24kHz in both directions.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::openai::{
    DEFAULT_REALTIME_MODEL, DEFAULT_REALTIME_VOICE, DEFAULT_TRANSCRIPTION_LANGUAGE,
    DEFAULT_TRANSCRIPTION_MODEL, OPENAI_REALTIME_SAMPLE_RATE,
};

/// Default instruction text sent with every session negotiation.
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful AI assistant. Be friendly, concise, and helpful.
Respond naturally in conversation. If the user asks a question, answer it directly.
If they want to chat, engage in friendly conversation.";

// =============================================================================
// Error Types
// =============================================================================

/// Failure to establish an upstream session.
///
/// Fatal to the session: it never reaches `Active`.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Credentials missing or rejected by the backend
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Socket could not be opened
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Socket open did not complete in time
    #[error("Connection timed out after {0}s")]
    Timeout(u64),

    /// Endpoint or header values could not be built
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Negotiation payload could not be sent
    #[error("Session negotiation failed: {0}")]
    Negotiation(String),

    /// `connect` called twice on the same client
    #[error("Already connected")]
    AlreadyConnected,
}

/// Mid-session socket failure on either side of the relay.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Operation attempted before connect or after disconnect
    #[error("Not connected")]
    NotConnected,

    /// The writer side of the socket has shut down
    #[error("Connection closed")]
    Closed,

    /// The event stream for this connection was already handed out
    #[error("Event stream already taken for this connection")]
    StreamTaken,

    /// Underlying WebSocket failure
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Outbound event could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A single frame that could not be decoded.
///
/// Recoverable: the frame is dropped (or reported as one `Error` event)
/// and the pipeline continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Missing message type")]
    MissingType,

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Malformed {message_type} message: {reason}")]
    Malformed {
        message_type: String,
        reason: String,
    },

    #[error("Invalid base64 audio: {0}")]
    InvalidAudio(String),

    #[error("Audio chunk of {size} bytes exceeds limit of {limit} bytes")]
    ChunkTooLarge { size: usize, limit: usize },
}

// =============================================================================
// Session Configuration
// =============================================================================

/// Audio encodings the relay can negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioEncoding {
    /// PCM 16-bit signed little-endian
    #[default]
    Pcm,
    /// G.711 u-law
    Pcmu,
    /// G.711 a-law
    Pcma,
}

impl AudioEncoding {
    /// MIME-style name used on the wire.
    #[inline]
    pub fn as_mime(&self) -> &'static str {
        match self {
            Self::Pcm => "audio/pcm",
            Self::Pcmu => "audio/pcmu",
            Self::Pcma => "audio/pcma",
        }
    }

    /// Parse an encoding name, accepting the common G.711 aliases.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.trim().to_lowercase().as_str() {
            "pcm" | "pcm16" | "audio/pcm" | "linear16" => Ok(Self::Pcm),
            "pcmu" | "g711_ulaw" | "ulaw" | "mulaw" | "audio/pcmu" => Ok(Self::Pcmu),
            "pcma" | "g711_alaw" | "alaw" | "audio/pcma" => Ok(Self::Pcma),
            other => Err(format!(
                "unsupported audio format '{other}' (expected pcm, pcmu or pcma)"
            )),
        }
    }
}

/// Codec plus sample rate for one audio direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub encoding: AudioEncoding,
    pub sample_rate: u32,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            encoding: AudioEncoding::Pcm,
            sample_rate: OPENAI_REALTIME_SAMPLE_RATE,
        }
    }
}

/// Input transcription settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// ISO-639-1 language code
    pub language: String,
    pub model: String,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            language: DEFAULT_TRANSCRIPTION_LANGUAGE.to_string(),
            model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
        }
    }
}

/// Server-side voice activity detection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VadConfig {
    /// When false the negotiation disables turn detection entirely
    pub enabled: bool,
    /// Automatically create a response when the caller stops speaking
    pub create_response: bool,
    /// Truncate the in-progress response when the caller starts speaking
    pub interrupt_response: bool,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
    /// Activation threshold (0.0 - 1.0)
    pub threshold: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            create_response: true,
            interrupt_response: true,
            prefix_padding_ms: 500,
            silence_duration_ms: 800,
            threshold: 0.5,
        }
    }
}

/// Input noise reduction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseReduction {
    /// Headsets and close-talking microphones
    NearField,
    /// Laptop and conference-room microphones
    FarField,
}

impl NoiseReduction {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NearField => "near_field",
            Self::FarField => "far_field",
        }
    }

    /// Parse a mode name. `off`, `none` and empty disable noise reduction.
    pub fn parse(s: &str) -> Result<Option<Self>, String> {
        match s.trim().to_lowercase().as_str() {
            "near_field" | "near" => Ok(Some(Self::NearField)),
            "far_field" | "far" => Ok(Some(Self::FarField)),
            "" | "off" | "none" | "null" => Ok(None),
            other => Err(format!(
                "unsupported noise reduction mode '{other}' (expected near_field, far_field or off)"
            )),
        }
    }
}

/// Immutable negotiation parameters for one upstream session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub model: String,
    pub voice: String,
    pub instructions: String,
    pub input_audio: AudioFormat,
    pub output_audio: AudioFormat,
    /// `None` disables input transcription
    pub transcription: Option<TranscriptionConfig>,
    pub vad: VadConfig,
    /// `None` disables noise reduction
    pub noise_reduction: Option<NoiseReduction>,
    /// Output speech speed (0.25 - 1.5)
    pub output_speed: f32,
    pub output_modalities: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_REALTIME_MODEL.to_string(),
            voice: DEFAULT_REALTIME_VOICE.to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            input_audio: AudioFormat::default(),
            output_audio: AudioFormat::default(),
            transcription: Some(TranscriptionConfig::default()),
            vad: VadConfig::default(),
            noise_reduction: Some(NoiseReduction::NearField),
            output_speed: 1.0,
            output_modalities: vec!["audio".to_string()],
        }
    }
}

impl SessionConfig {
    /// Check value ranges before the config is used for negotiation.
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("realtime model must not be empty".to_string());
        }
        if self.voice.trim().is_empty() {
            return Err("realtime voice must not be empty".to_string());
        }
        if !(0.0..=1.0).contains(&self.vad.threshold) {
            return Err(format!(
                "VAD threshold must be between 0.0 and 1.0, got {}",
                self.vad.threshold
            ));
        }
        if !(0.25..=1.5).contains(&self.output_speed) {
            return Err(format!(
                "output speed must be between 0.25 and 1.5, got {}",
                self.output_speed
            ));
        }
        if self.input_audio.sample_rate == 0 || self.output_audio.sample_rate == 0 {
            return Err("audio sample rate must be greater than zero".to_string());
        }
        if self.output_modalities.is_empty() {
            return Err("at least one output modality is required".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Upstream Events
// =============================================================================

/// One parsed inbound frame from the upstream backend.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    SessionCreated,
    SessionUpdated,
    /// Final transcription of the caller's utterance
    UserTranscript { text: String },
    AgentTranscriptDelta { text: String },
    AgentTranscriptComplete { text: String },
    /// Decoded synthesized audio
    AudioDelta { audio: Bytes },
    AudioComplete,
    ResponseComplete,
    /// The in-progress response was truncated by barge-in
    Interrupted,
    SpeechStarted,
    /// Backend-reported error, or a frame that could not be decoded
    Error { message: String },
    /// Recognized frame with an event name outside the lookup table
    Unknown { event_type: String, raw: String },
}

impl UpstreamEvent {
    /// Short category name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionCreated => "session_created",
            Self::SessionUpdated => "session_updated",
            Self::UserTranscript { .. } => "user_transcript",
            Self::AgentTranscriptDelta { .. } => "agent_transcript_delta",
            Self::AgentTranscriptComplete { .. } => "agent_transcript_complete",
            Self::AudioDelta { .. } => "audio_delta",
            Self::AudioComplete => "audio_complete",
            Self::ResponseComplete => "response_complete",
            Self::Interrupted => "interrupted",
            Self::SpeechStarted => "speech_started",
            Self::Error { .. } => "error",
            Self::Unknown { .. } => "unknown",
        }
    }
}

impl fmt::Display for UpstreamEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown { event_type, .. } => write!(f, "unknown({event_type})"),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// Lazy, single-consumer sequence of upstream events.
///
/// Ends when the upstream transport closes. Dropping it stops the read loop.
pub type UpstreamEventStream = BoxStream<'static, UpstreamEvent>;

// =============================================================================
// Upstream Client Trait
// =============================================================================

/// Contract for a client of a hosted speech-to-speech backend.
///
/// All methods take `&self`: the relay drives sends from one pipeline while
/// the other pipeline consumes the event stream, and either may trigger
/// `disconnect`.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Open the socket and send session negotiation.
    ///
    /// Returns once the negotiation frame is written. The acknowledgment
    /// arrives later as a `SessionCreated`/`SessionUpdated` event.
    async fn connect(&self, config: &SessionConfig) -> Result<(), ConnectError>;

    /// Append one opaque audio chunk to the upstream input buffer.
    ///
    /// Calls are delivered to the socket in call order.
    async fn send_audio(&self, chunk: Bytes) -> Result<(), TransportError>;

    /// Finalize the current input buffer as one utterance.
    ///
    /// Callers must only commit after at least one `send_audio` since the
    /// previous commit.
    async fn commit_audio(&self) -> Result<(), TransportError>;

    /// Take the inbound event sequence for this connection.
    ///
    /// Can be taken once per connect.
    fn listen_for_events(&self) -> Result<UpstreamEventStream, TransportError>;

    /// Insert a text conversation item for scripted speech.
    async fn create_conversation_item(&self, text: &str) -> Result<(), TransportError>;

    /// Ask the backend to generate a response now.
    async fn trigger_response(&self) -> Result<(), TransportError>;

    /// Close the socket. Idempotent.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Whether the client is connected and not yet disconnected.
    fn is_connected(&self) -> bool;
}

/// Boxed upstream client owned by a relay session.
pub type BoxedUpstream = Box<dyn UpstreamClient>;
