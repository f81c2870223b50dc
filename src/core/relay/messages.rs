//! Client-facing relay protocol.
//!
//! Inbound frames are decoded into [`ClientMessage`]; outbound events are
//! [`ClientEnvelope`] values serialized as JSON text frames with a stable
//! `type` discriminator.

use base64::prelude::*;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::core::realtime::DecodeError;

/// Sent to the client when the upstream session cannot be established.
pub const CONNECT_FAILED_MESSAGE: &str = "Failed to connect to OpenAI Realtime API";

/// Sent when the client goes quiet for longer than the idle timeout.
pub const IDLE_TIMEOUT_MESSAGE: &str = "Connection closed due to inactivity";

/// Sent when the upstream socket drops mid-session.
pub const UPSTREAM_LOST_MESSAGE: &str = "Connection to AI agent lost";

pub const CONNECTED_MESSAGE: &str = "Connected to AI agent";

pub const INTERRUPTED_MESSAGE: &str = "User interrupted AI";

/// Transport-neutral view of one client socket frame.
///
/// The WebSocket handler converts framework messages to and from this type
/// so the relay core never depends on a particular server library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Text(String),
    Binary(Bytes),
    Ping,
    Pong,
    Close,
}

/// A decoded inbound client message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// One chunk of caller microphone audio, already base64-decoded
    AudioChunk { payload: Bytes },
    /// The caller finished one utterance
    AudioComplete,
}

/// Wire shape of inbound JSON messages.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IncomingMessage {
    AudioChunk { data: String },
    AudioComplete,
}

impl ClientMessage {
    /// Decode a JSON text frame.
    pub fn from_text(text: &str) -> Result<Self, DecodeError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

        let message_type = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or(DecodeError::MissingType)?;

        if !matches!(message_type, "audio_chunk" | "audio_complete") {
            return Err(DecodeError::UnknownType(message_type.to_string()));
        }
        let message_type = message_type.to_string();

        let incoming: IncomingMessage =
            serde_json::from_value(value).map_err(|e| DecodeError::Malformed {
                message_type,
                reason: e.to_string(),
            })?;

        match incoming {
            IncomingMessage::AudioChunk { data } => {
                let payload = BASE64_STANDARD
                    .decode(data.as_bytes())
                    .map_err(|e| DecodeError::InvalidAudio(e.to_string()))?;
                Ok(Self::AudioChunk {
                    payload: Bytes::from(payload),
                })
            }
            IncomingMessage::AudioComplete => Ok(Self::AudioComplete),
        }
    }
}

/// Outbound client event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEnvelope {
    ConnectionEstablished { message: String },
    UserTranscript { text: String },
    AgentTranscriptDelta { text: String },
    AgentTranscriptComplete { text: String },
    /// Base64-encoded synthesized audio
    AudioDelta { audio: String },
    AudioComplete,
    ResponseComplete,
    Interruption { message: String },
    SpeechStarted,
    Error { message: String },
}

impl ClientEnvelope {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// The `type` discriminator as sent on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished { .. } => "connection_established",
            Self::UserTranscript { .. } => "user_transcript",
            Self::AgentTranscriptDelta { .. } => "agent_transcript_delta",
            Self::AgentTranscriptComplete { .. } => "agent_transcript_complete",
            Self::AudioDelta { .. } => "audio_delta",
            Self::AudioComplete => "audio_complete",
            Self::ResponseComplete => "response_complete",
            Self::Interruption { .. } => "interruption",
            Self::SpeechStarted => "speech_started",
            Self::Error { .. } => "error",
        }
    }

    /// Serialize into a text frame.
    pub fn to_frame(&self) -> Result<ClientFrame, serde_json::Error> {
        serde_json::to_string(self).map(ClientFrame::Text)
    }
}
