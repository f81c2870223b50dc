//! Client to upstream pipeline.

use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use super::error::RelayError;
use super::messages::{ClientFrame, ClientMessage};
use crate::core::realtime::{DecodeError, TransportError, UpstreamClient};

/// Why the client pipeline stopped.
#[derive(Debug)]
pub enum LinkExit {
    /// Close frame or end of the inbound stream
    ClientClosed,
    Failed(RelayError),
}

/// Reads client frames and drives the upstream send side.
///
/// Owns the pending-chunk counter: it is only touched from this pipeline.
#[derive(Debug)]
pub struct ClientLink {
    pending_chunks: usize,
    max_chunk_bytes: usize,
    idle_timeout: Option<Duration>,
    chunks_forwarded: u64,
    commits: u64,
}

impl ClientLink {
    pub fn new(max_chunk_bytes: usize, idle_timeout: Option<Duration>) -> Self {
        Self {
            pending_chunks: 0,
            max_chunk_bytes,
            idle_timeout,
            chunks_forwarded: 0,
            commits: 0,
        }
    }

    /// Chunks sent upstream since the last commit.
    pub fn pending_chunks(&self) -> usize {
        self.pending_chunks
    }

    pub fn chunks_forwarded(&self) -> u64 {
        self.chunks_forwarded
    }

    pub fn commits(&self) -> u64 {
        self.commits
    }

    /// Decode one frame. `Ok(None)` means there is nothing to act on.
    pub fn decode(&self, frame: ClientFrame) -> Result<Option<ClientMessage>, DecodeError> {
        let message = match frame {
            ClientFrame::Text(text) => ClientMessage::from_text(&text)?,
            ClientFrame::Binary(payload) => ClientMessage::AudioChunk { payload },
            ClientFrame::Ping | ClientFrame::Pong | ClientFrame::Close => return Ok(None),
        };

        if let ClientMessage::AudioChunk { payload } = &message {
            if payload.len() > self.max_chunk_bytes {
                return Err(DecodeError::ChunkTooLarge {
                    size: payload.len(),
                    limit: self.max_chunk_bytes,
                });
            }
        }

        Ok(Some(message))
    }

    /// Apply one decoded message to the upstream.
    pub async fn handle(
        &mut self,
        message: ClientMessage,
        upstream: &dyn UpstreamClient,
    ) -> Result<(), TransportError> {
        match message {
            ClientMessage::AudioChunk { payload } => self.forward_chunk(payload, upstream).await,
            ClientMessage::AudioComplete => {
                if self.pending_chunks == 0 {
                    debug!("audio_complete with no pending audio, skipping commit");
                    return Ok(());
                }
                upstream.commit_audio().await?;
                debug!(chunks = self.pending_chunks, "Committed input audio buffer");
                self.pending_chunks = 0;
                self.commits += 1;
                Ok(())
            }
        }
    }

    async fn forward_chunk(
        &mut self,
        payload: Bytes,
        upstream: &dyn UpstreamClient,
    ) -> Result<(), TransportError> {
        upstream.send_audio(payload).await?;
        self.pending_chunks += 1;
        self.chunks_forwarded += 1;
        Ok(())
    }

    /// Pull the next frame, bounded by the idle timeout when one is set.
    async fn next_frame<S>(
        &self,
        frames: &mut S,
    ) -> Result<Option<Result<ClientFrame, TransportError>>, RelayError>
    where
        S: Stream<Item = Result<ClientFrame, TransportError>> + Unpin,
    {
        match self.idle_timeout {
            Some(window) => tokio::time::timeout(window, frames.next())
                .await
                .map_err(|_| RelayError::IdleTimeout(window)),
            None => Ok(frames.next().await),
        }
    }

    /// Run until the client closes or a fatal error occurs.
    pub async fn run<S>(&mut self, frames: &mut S, upstream: &dyn UpstreamClient) -> LinkExit
    where
        S: Stream<Item = Result<ClientFrame, TransportError>> + Unpin,
    {
        loop {
            let frame = match self.next_frame(frames).await {
                Ok(Some(Ok(frame))) => frame,
                Ok(Some(Err(e))) => return LinkExit::Failed(RelayError::ClientRead(e)),
                Ok(None) => return LinkExit::ClientClosed,
                Err(e) => return LinkExit::Failed(e),
            };

            if frame == ClientFrame::Close {
                debug!("Client sent close frame");
                return LinkExit::ClientClosed;
            }

            let message = match self.decode(frame) {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Dropping client frame: {}", e);
                    continue;
                }
            };

            if let Err(e) = self.handle(message, upstream).await {
                return LinkExit::Failed(RelayError::UpstreamSend(e));
            }
        }
    }
}
