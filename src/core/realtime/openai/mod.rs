//! OpenAI Realtime API module.
//!
//! Speech-to-speech upstream backed by OpenAI's WebSocket Realtime API.
//!
//! # Supported Voices
//!
//! alloy, ash, ballad, cedar, coral, echo, marin, sage, shimmer, verse
//!
//! # Audio Format
//!
//! Input and output audio is PCM 16-bit signed little-endian at 24kHz.
//! G.711 u-law and a-law are also accepted at 8kHz.

mod client;
mod config;
mod messages;

pub use client::OpenAIRealtime;
pub use config::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_REALTIME_MODEL, DEFAULT_REALTIME_VOICE,
    DEFAULT_TRANSCRIPTION_LANGUAGE, DEFAULT_TRANSCRIPTION_MODEL, OPENAI_REALTIME_SAMPLE_RATE,
    OPENAI_REALTIME_URL, OpenAIRealtimeConfig, OpenAIRealtimeVoice,
};
pub use messages::{ClientEvent, SessionPayload, parse_server_event};
