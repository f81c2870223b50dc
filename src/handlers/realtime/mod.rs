//! Relay WebSocket endpoint
//!
//! Each accepted socket becomes one relay session bridged to the upstream
//! speech-to-speech backend.
//!
//! ## Client → Server
//!
//! - **Binary frames**: raw audio in the negotiated input format
//! - **audio_chunk**: `{"type":"audio_chunk","data":"<base64>"}`
//! - **audio_complete**: commit the buffered audio and request a reply
//!
//! ## Server → Client
//!
//! - **connection_established**, **user_transcript**,
//!   **agent_transcript_delta**, **agent_transcript_complete**
//! - **audio_delta** (base64), **audio_complete**, **response_complete**
//! - **interruption**, **speech_started**, **error**

mod handler;

pub use handler::realtime_handler;
