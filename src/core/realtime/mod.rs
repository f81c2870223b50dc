//! Upstream realtime speech backend.
//!
//! [`UpstreamClient`] is the seam between the relay and a hosted
//! speech-to-speech API. [`OpenAIRealtime`] is the production implementation;
//! tests plug in their own.

mod base;
pub mod openai;

pub use base::{
    AudioEncoding, AudioFormat, BoxedUpstream, ConnectError, DEFAULT_INSTRUCTIONS, DecodeError,
    NoiseReduction, SessionConfig, TranscriptionConfig, TransportError, UpstreamClient,
    UpstreamEvent, UpstreamEventStream, VadConfig,
};
pub use openai::{OpenAIRealtime, OpenAIRealtimeConfig, OpenAIRealtimeVoice};
