//! Scripted in-process upstream.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::channel::mpsc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use voice_relay::core::realtime::{
    ConnectError, SessionConfig, TransportError, UpstreamClient, UpstreamEvent,
    UpstreamEventStream,
};

/// One recorded call on the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamCall {
    Connect { model: String },
    SendAudio(Bytes),
    Commit,
    ConversationItem(String),
    TriggerResponse,
    Disconnect,
}

/// Call log shared between the mock and the test.
#[derive(Debug, Default)]
pub struct UpstreamRecorder {
    calls: Mutex<Vec<UpstreamCall>>,
}

impl UpstreamRecorder {
    fn record(&self, call: UpstreamCall) {
        self.calls.lock().push(call);
    }

    pub fn calls(&self) -> Vec<UpstreamCall> {
        self.calls.lock().clone()
    }

    pub fn sent_audio(&self) -> Vec<Bytes> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                UpstreamCall::SendAudio(chunk) => Some(chunk.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn commits(&self) -> usize {
        self.count(|call| matches!(call, UpstreamCall::Commit))
    }

    pub fn disconnects(&self) -> usize {
        self.count(|call| matches!(call, UpstreamCall::Disconnect))
    }

    fn count(&self, predicate: impl Fn(&UpstreamCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }
}

/// `UpstreamClient` driven by a channel of events.
///
/// Dropping the event sender ends the event stream, which the relay treats
/// as the upstream closing.
pub struct MockUpstream {
    recorder: Arc<UpstreamRecorder>,
    events: Mutex<Option<mpsc::UnboundedReceiver<UpstreamEvent>>>,
    connect_error: Mutex<Option<ConnectError>>,
    connected: AtomicBool,
}

impl MockUpstream {
    pub fn new() -> (
        Self,
        Arc<UpstreamRecorder>,
        mpsc::UnboundedSender<UpstreamEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded();
        let recorder = Arc::new(UpstreamRecorder::default());
        let mock = Self {
            recorder: recorder.clone(),
            events: Mutex::new(Some(rx)),
            connect_error: Mutex::new(None),
            connected: AtomicBool::new(false),
        };
        (mock, recorder, tx)
    }

    /// A mock whose `connect` fails with `error`.
    pub fn failing(error: ConnectError) -> (Self, Arc<UpstreamRecorder>) {
        let (mock, recorder, _events) = Self::new();
        *mock.connect_error.lock() = Some(error);
        (mock, recorder)
    }

    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

#[async_trait]
impl UpstreamClient for MockUpstream {
    async fn connect(&self, config: &SessionConfig) -> Result<(), ConnectError> {
        self.recorder.record(UpstreamCall::Connect {
            model: config.model.clone(),
        });
        if let Some(error) = self.connect_error.lock().take() {
            return Err(error);
        }
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn send_audio(&self, chunk: Bytes) -> Result<(), TransportError> {
        self.ensure_connected()?;
        self.recorder.record(UpstreamCall::SendAudio(chunk));
        Ok(())
    }

    async fn commit_audio(&self) -> Result<(), TransportError> {
        self.ensure_connected()?;
        self.recorder.record(UpstreamCall::Commit);
        Ok(())
    }

    fn listen_for_events(&self) -> Result<UpstreamEventStream, TransportError> {
        self.ensure_connected()?;
        let events = self
            .events
            .lock()
            .take()
            .ok_or(TransportError::StreamTaken)?;
        Ok(events.boxed())
    }

    async fn create_conversation_item(&self, text: &str) -> Result<(), TransportError> {
        self.ensure_connected()?;
        self.recorder
            .record(UpstreamCall::ConversationItem(text.to_string()));
        Ok(())
    }

    async fn trigger_response(&self) -> Result<(), TransportError> {
        self.ensure_connected()?;
        self.recorder.record(UpstreamCall::TriggerResponse);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.recorder.record(UpstreamCall::Disconnect);
        self.connected.store(false, Ordering::Release);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}
