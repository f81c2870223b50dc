//! OpenAI Realtime API WebSocket message types.
//!
//! Client events are serialized with a `type` discriminator. Server events
//! are classified through a static lookup table and only the categories the
//! relay surfaces are decoded; everything else becomes
//! [`UpstreamEvent::Unknown`].

use base64::prelude::*;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::realtime::base::{DecodeError, SessionConfig, UpstreamEvent};

/// Fallback when an `error` event carries no message.
const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";

// =============================================================================
// Client Events (sent to OpenAI)
// =============================================================================

/// Events sent from the relay to the OpenAI Realtime API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Negotiate session parameters
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionPayload },

    /// Append audio to the input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded audio
        audio: String,
    },

    /// Commit the input buffer as one user turn
    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit,

    /// Add an item to the conversation
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },

    /// Ask the model to respond
    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl ClientEvent {
    /// Create an audio append event from raw audio bytes.
    pub fn audio_append(audio: &[u8]) -> Self {
        Self::InputAudioBufferAppend {
            audio: BASE64_STANDARD.encode(audio),
        }
    }

    /// Create a text message item with the given role.
    pub fn text_item(role: &str, text: &str) -> Self {
        Self::ConversationItemCreate {
            item: ConversationItem {
                item_type: "message".to_string(),
                role: role.to_string(),
                content: vec![ContentPart {
                    content_type: "input_text".to_string(),
                    text: text.to_string(),
                }],
            },
        }
    }
}

/// Session block of a `session.update` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionPayload {
    /// Always `realtime` for speech-to-speech sessions
    #[serde(rename = "type")]
    pub session_type: String,
    pub model: String,
    pub audio: AudioPayload,
    pub output_modalities: Vec<String>,
    pub instructions: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioPayload {
    pub input: AudioInputPayload,
    pub output: AudioOutputPayload,
}

/// Input side of the audio block. `None` sections serialize as `null`,
/// which disables that feature upstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioInputPayload {
    pub format: AudioFormatPayload,
    pub transcription: Option<TranscriptionPayload>,
    pub turn_detection: Option<TurnDetectionPayload>,
    pub noise_reduction: Option<NoiseReductionPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioOutputPayload {
    pub format: AudioFormatPayload,
    pub speed: f32,
    pub voice: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioFormatPayload {
    #[serde(rename = "type")]
    pub format_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptionPayload {
    pub language: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnDetectionPayload {
    #[serde(rename = "type")]
    pub detection_type: String,
    pub create_response: bool,
    pub interrupt_response: bool,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
    pub threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NoiseReductionPayload {
    #[serde(rename = "type")]
    pub reduction_type: String,
}

/// Conversation item for `conversation.item.create`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationItem {
    #[serde(rename = "type")]
    pub item_type: String,
    pub role: String,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

impl From<&SessionConfig> for SessionPayload {
    fn from(config: &SessionConfig) -> Self {
        // Only PCM carries an explicit rate; G.711 is fixed at 8kHz.
        let format = |audio: &crate::core::realtime::base::AudioFormat| AudioFormatPayload {
            format_type: audio.encoding.as_mime().to_string(),
            rate: matches!(
                audio.encoding,
                crate::core::realtime::base::AudioEncoding::Pcm
            )
            .then_some(audio.sample_rate),
        };

        let turn_detection = config.vad.enabled.then(|| TurnDetectionPayload {
            detection_type: "server_vad".to_string(),
            create_response: config.vad.create_response,
            interrupt_response: config.vad.interrupt_response,
            prefix_padding_ms: config.vad.prefix_padding_ms,
            silence_duration_ms: config.vad.silence_duration_ms,
            threshold: config.vad.threshold,
        });

        Self {
            session_type: "realtime".to_string(),
            model: config.model.clone(),
            audio: AudioPayload {
                input: AudioInputPayload {
                    format: format(&config.input_audio),
                    transcription: config.transcription.as_ref().map(|t| TranscriptionPayload {
                        language: t.language.clone(),
                        model: t.model.clone(),
                    }),
                    turn_detection,
                    noise_reduction: config.noise_reduction.map(|mode| NoiseReductionPayload {
                        reduction_type: mode.as_str().to_string(),
                    }),
                },
                output: AudioOutputPayload {
                    format: format(&config.output_audio),
                    speed: config.output_speed,
                    voice: config.voice.clone(),
                },
            },
            output_modalities: config.output_modalities.clone(),
            instructions: config.instructions.clone(),
        }
    }
}

// =============================================================================
// Server Events (received from OpenAI)
// =============================================================================

/// Server event categories the relay decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerEventKind {
    SessionCreated,
    SessionUpdated,
    InputTranscriptionCompleted,
    OutputTranscriptDelta,
    OutputTranscriptDone,
    OutputAudioDelta,
    OutputAudioDone,
    ResponseDone,
    ItemTruncated,
    SpeechStarted,
    Error,
}

/// Wire event name to category.
static SERVER_EVENT_KINDS: phf::Map<&'static str, ServerEventKind> = phf::phf_map! {
    "session.created" => ServerEventKind::SessionCreated,
    "session.updated" => ServerEventKind::SessionUpdated,
    "conversation.item.input_audio_transcription.completed" => ServerEventKind::InputTranscriptionCompleted,
    "response.output_audio_transcript.delta" => ServerEventKind::OutputTranscriptDelta,
    "response.output_audio_transcript.done" => ServerEventKind::OutputTranscriptDone,
    "response.output_audio.delta" => ServerEventKind::OutputAudioDelta,
    "response.output_audio.done" => ServerEventKind::OutputAudioDone,
    "response.done" => ServerEventKind::ResponseDone,
    "conversation.item.truncated" => ServerEventKind::ItemTruncated,
    "input_audio_buffer.speech_started" => ServerEventKind::SpeechStarted,
    "error" => ServerEventKind::Error,
};

#[derive(Debug, Deserialize)]
struct TranscriptBody {
    #[serde(default)]
    transcript: String,
}

#[derive(Debug, Deserialize)]
struct DeltaBody {
    #[serde(default)]
    delta: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<ApiError>,
}

/// Error details from an OpenAI `error` event.
#[derive(Debug, Clone, Deserialize)]
struct ApiError {
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn decode_body<T: DeserializeOwned>(
    event_type: &str,
    value: serde_json::Value,
) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|e| DecodeError::Malformed {
        message_type: event_type.to_string(),
        reason: e.to_string(),
    })
}

/// Parse one inbound text frame into an [`UpstreamEvent`].
///
/// Unrecognized event names are not an error: they come back as
/// `UpstreamEvent::Unknown` with the raw frame attached.
pub fn parse_server_event(text: &str) -> Result<UpstreamEvent, DecodeError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

    let event_type = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or(DecodeError::MissingType)?
        .to_string();

    let Some(kind) = SERVER_EVENT_KINDS.get(event_type.as_str()).copied() else {
        return Ok(UpstreamEvent::Unknown {
            event_type,
            raw: text.to_string(),
        });
    };

    let event = match kind {
        ServerEventKind::SessionCreated => UpstreamEvent::SessionCreated,
        ServerEventKind::SessionUpdated => UpstreamEvent::SessionUpdated,
        ServerEventKind::InputTranscriptionCompleted => UpstreamEvent::UserTranscript {
            text: decode_body::<TranscriptBody>(&event_type, value)?.transcript,
        },
        ServerEventKind::OutputTranscriptDelta => UpstreamEvent::AgentTranscriptDelta {
            text: decode_body::<DeltaBody>(&event_type, value)?.delta,
        },
        ServerEventKind::OutputTranscriptDone => UpstreamEvent::AgentTranscriptComplete {
            text: decode_body::<TranscriptBody>(&event_type, value)?.transcript,
        },
        ServerEventKind::OutputAudioDelta => {
            let delta = decode_body::<DeltaBody>(&event_type, value)?.delta;
            let audio = BASE64_STANDARD
                .decode(delta.as_bytes())
                .map_err(|e| DecodeError::InvalidAudio(e.to_string()))?;
            UpstreamEvent::AudioDelta {
                audio: Bytes::from(audio),
            }
        }
        ServerEventKind::OutputAudioDone => UpstreamEvent::AudioComplete,
        ServerEventKind::ResponseDone => UpstreamEvent::ResponseComplete,
        ServerEventKind::ItemTruncated => UpstreamEvent::Interrupted,
        ServerEventKind::SpeechStarted => UpstreamEvent::SpeechStarted,
        ServerEventKind::Error => {
            let error = decode_body::<ErrorBody>(&event_type, value)?.error;
            let message = match error {
                Some(ApiError {
                    error_type,
                    code,
                    message,
                }) => {
                    warn!(
                        error_type = error_type.as_deref().unwrap_or("unknown"),
                        code = code.as_deref().unwrap_or("none"),
                        "OpenAI Realtime API reported an error"
                    );
                    message
                }
                None => None,
            };
            UpstreamEvent::Error {
                message: message.unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string()),
            }
        }
    };

    Ok(event)
}
