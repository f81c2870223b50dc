//! Upstream to client pipeline.

use std::time::Duration;

use base64::prelude::*;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tracing::{debug, info, warn};

use super::messages::{CONNECTED_MESSAGE, ClientEnvelope, ClientFrame, INTERRUPTED_MESSAGE};
use crate::core::realtime::UpstreamEvent;

/// Why the forwarder stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwarderExit {
    /// The upstream event sequence ended.
    ///
    /// `error_forwarded` is set when the last envelope sent was an `error`,
    /// so the client has already been told why.
    UpstreamEnded { error_forwarded: bool },
    /// Writing to the client failed; the caller is gone.
    ClientGone,
}

/// Translates upstream events into client envelopes, in arrival order.
#[derive(Debug)]
pub struct EventForwarder {
    audio_complete_delay: Duration,
    forwarded: u64,
}

impl EventForwarder {
    pub fn new(audio_complete_delay: Duration) -> Self {
        Self {
            audio_complete_delay,
            forwarded: 0,
        }
    }

    /// Envelopes successfully written to the client.
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    /// Map one upstream event to its client envelope.
    ///
    /// Returns `None` for events that are consumed by the relay.
    pub fn to_envelope(event: UpstreamEvent) -> Option<ClientEnvelope> {
        match event {
            UpstreamEvent::SessionCreated => Some(ClientEnvelope::ConnectionEstablished {
                message: CONNECTED_MESSAGE.to_string(),
            }),
            UpstreamEvent::SessionUpdated => None,
            UpstreamEvent::UserTranscript { text } => Some(ClientEnvelope::UserTranscript { text }),
            UpstreamEvent::AgentTranscriptDelta { text } => {
                Some(ClientEnvelope::AgentTranscriptDelta { text })
            }
            UpstreamEvent::AgentTranscriptComplete { text } => {
                Some(ClientEnvelope::AgentTranscriptComplete { text })
            }
            UpstreamEvent::AudioDelta { audio } if audio.is_empty() => None,
            UpstreamEvent::AudioDelta { audio } => Some(ClientEnvelope::AudioDelta {
                audio: BASE64_STANDARD.encode(&audio),
            }),
            UpstreamEvent::AudioComplete => Some(ClientEnvelope::AudioComplete),
            UpstreamEvent::ResponseComplete => Some(ClientEnvelope::ResponseComplete),
            UpstreamEvent::Interrupted => Some(ClientEnvelope::Interruption {
                message: INTERRUPTED_MESSAGE.to_string(),
            }),
            UpstreamEvent::SpeechStarted => Some(ClientEnvelope::SpeechStarted),
            UpstreamEvent::Error { message } => Some(ClientEnvelope::Error { message }),
            UpstreamEvent::Unknown { .. } => None,
        }
    }

    /// Log an event at the level its category calls for.
    fn observe(event: &UpstreamEvent) {
        match event {
            // Rate-sensitive path, never logged per event.
            UpstreamEvent::AudioDelta { audio } => {
                if audio.is_empty() {
                    warn!("Dropping empty audio delta from upstream");
                }
            }
            UpstreamEvent::SessionUpdated => info!("Upstream session configuration acknowledged"),
            UpstreamEvent::Error { message } => warn!(%message, "Upstream reported error"),
            UpstreamEvent::Unknown { event_type, .. } => {
                if !event_type.starts_with("input_audio_buffer.") {
                    debug!(%event_type, "Ignoring unhandled upstream event");
                }
            }
            other => info!(event = %other, "Forwarding upstream event"),
        }
    }

    /// Drain `events` into `sink` until either side ends.
    pub async fn run<S, K>(&mut self, mut events: S, sink: &mut K) -> ForwarderExit
    where
        S: Stream<Item = UpstreamEvent> + Unpin,
        K: Sink<ClientFrame> + Unpin,
    {
        let mut last_was_error = false;

        while let Some(event) = events.next().await {
            Self::observe(&event);

            let Some(envelope) = Self::to_envelope(event) else {
                continue;
            };

            if matches!(envelope, ClientEnvelope::AudioComplete)
                && !self.audio_complete_delay.is_zero()
            {
                // Let the client's playback buffer drain before signalling the end.
                tokio::time::sleep(self.audio_complete_delay).await;
            }

            let frame = match envelope.to_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(kind = envelope.kind(), "Failed to serialize envelope: {}", e);
                    continue;
                }
            };

            if sink.send(frame).await.is_err() {
                debug!("Client write failed, stopping forwarder");
                return ForwarderExit::ClientGone;
            }

            self.forwarded += 1;
            last_was_error = matches!(envelope, ClientEnvelope::Error { .. });
        }

        ForwarderExit::UpstreamEnded {
            error_forwarded: last_was_error,
        }
    }
}
