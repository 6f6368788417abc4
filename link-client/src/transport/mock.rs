//! Mock transport for testing.
//!
//! A [`MockTransport`] is either standalone (sends are only recorded) or one
//! end of an in-memory pair created with [`MockTransport::pair`], in which
//! case sends are delivered to the other end's event sink. Reachability is
//! shared by both ends, like the platform link it stands in for.

use super::{EventSink, Transport, TransportError, TransportEvent};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use wristlink_types::TelemetryMessage;

/// Mock transport for testing.
///
/// Allows forcing failures, dropping messages silently, flipping
/// reachability and capturing sent messages for verification.
#[derive(Debug, Clone)]
pub struct MockTransport {
    wire: Arc<Mutex<MockWire>>,
    side: usize,
}

#[derive(Debug)]
struct MockWire {
    reachable: bool,
    ends: [MockEnd; 2],
}

#[derive(Debug, Default)]
struct MockEnd {
    unsupported: bool,
    sink: Option<EventSink>,
    activations: usize,
    sent_messages: Vec<Vec<u8>>,
    fail_next_activate: Option<String>,
    fail_next_send: Option<String>,
    drop_next_send: bool,
}

impl MockTransport {
    /// Create a standalone mock transport (reachable, nothing on the other end).
    pub fn new() -> Self {
        Self {
            wire: Arc::new(Mutex::new(MockWire {
                reachable: true,
                ends: [MockEnd::default(), MockEnd::default()],
            })),
            side: 0,
        }
    }

    /// Create two connected ends, initially reachable.
    pub fn pair() -> (Self, Self) {
        let first = Self::new();
        let second = Self {
            wire: Arc::clone(&first.wire),
            side: 1,
        };
        (first, second)
    }

    /// Create a transport that does not exist in this runtime.
    pub fn unsupported() -> Self {
        let transport = Self::new();
        transport.wire.lock().unwrap().ends[0].unsupported = true;
        transport
    }

    /// Flip shared reachability and notify every activated end.
    pub fn set_reachable(&self, reachable: bool) {
        let mut wire = self.wire.lock().unwrap();
        wire.reachable = reachable;
        for end in wire.ends.iter() {
            if let Some(sink) = &end.sink {
                sink.emit(TransportEvent::ReachabilityChanged(reachable));
            }
        }
    }

    /// Invalidate this end's session, as the platform would on a watch switch.
    pub fn deactivate(&self) {
        let mut wire = self.wire.lock().unwrap();
        if let Some(sink) = wire.ends[self.side].sink.take() {
            sink.emit(TransportEvent::Deactivated);
        }
    }

    /// Deliver a message to this end as if the counterpart sent it.
    pub fn inject(&self, message: &TelemetryMessage) {
        let bytes = message.to_bytes().unwrap();
        self.inject_raw(bytes);
    }

    /// Deliver raw bytes to this end.
    pub fn inject_raw(&self, bytes: Vec<u8>) {
        let wire = self.wire.lock().unwrap();
        if let Some(sink) = &wire.ends[self.side].sink {
            sink.emit(TransportEvent::Received(bytes));
        }
    }

    /// Get all messages that were sent from this end.
    pub fn sent_messages(&self) -> Vec<Vec<u8>> {
        let wire = self.wire.lock().unwrap();
        wire.ends[self.side].sent_messages.clone()
    }

    /// Decode every message sent from this end.
    pub fn sent_telemetry(&self) -> Vec<TelemetryMessage> {
        self.sent_messages()
            .iter()
            .filter_map(|bytes| TelemetryMessage::from_bytes(bytes).ok())
            .collect()
    }

    /// Number of successful activations of this end.
    pub fn activation_count(&self) -> usize {
        let wire = self.wire.lock().unwrap();
        wire.ends[self.side].activations
    }

    /// Cause the next activate() to fail with the given error.
    pub fn fail_next_activate(&self, error: &str) {
        let mut wire = self.wire.lock().unwrap();
        wire.ends[self.side].fail_next_activate = Some(error.to_string());
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        let mut wire = self.wire.lock().unwrap();
        wire.ends[self.side].fail_next_send = Some(error.to_string());
    }

    /// Accept the next send() but never deliver it.
    pub fn drop_next_send(&self) {
        let mut wire = self.wire.lock().unwrap();
        wire.ends[self.side].drop_next_send = true;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn is_supported(&self) -> bool {
        let wire = self.wire.lock().unwrap();
        !wire.ends[self.side].unsupported
    }

    async fn activate(&self, events: EventSink) -> Result<(), TransportError> {
        let mut wire = self.wire.lock().unwrap();
        let reachable = wire.reachable;
        let end = &mut wire.ends[self.side];

        if end.unsupported {
            return Err(TransportError::Unsupported);
        }

        // Check for forced failure
        if let Some(error) = end.fail_next_activate.take() {
            events.emit(TransportEvent::ActivationFailed(error.clone()));
            return Err(TransportError::ActivationFailed(error));
        }

        end.activations += 1;
        events.emit(TransportEvent::Activated);
        events.emit(TransportEvent::ReachabilityChanged(reachable));
        end.sink = Some(events);
        Ok(())
    }

    fn is_reachable(&self) -> bool {
        let wire = self.wire.lock().unwrap();
        wire.reachable
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut wire = self.wire.lock().unwrap();
        let reachable = wire.reachable;
        let end = &mut wire.ends[self.side];

        if end.sink.is_none() {
            return Err(TransportError::NotActivated);
        }
        if !reachable {
            return Err(TransportError::NotReachable);
        }

        // Check for forced failure
        if let Some(error) = end.fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }

        end.sent_messages.push(data.to_vec());
        if std::mem::take(&mut end.drop_next_send) {
            return Ok(());
        }

        let other = &wire.ends[1 - self.side];
        if let Some(sink) = &other.sink {
            sink.emit(TransportEvent::Received(data.to_vec()));
        }
        Ok(())
    }
}
