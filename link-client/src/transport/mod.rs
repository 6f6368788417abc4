//! Transport abstraction for wristlink.
//!
//! This module provides a pluggable transport layer that abstracts the
//! paired-device message channel (a platform watch-connectivity session,
//! mock for testing).
//!
//! # Design
//!
//! The transport is session-oriented and best-effort:
//! - `is_supported()` tells whether the transport exists in this runtime
//! - `activate()` requests a session and hands over the [`EventSink`]
//! - `send()` transmits one encoded message to the counterpart
//! - everything the transport observes (activation confirmed, reachability
//!   changes, inbound messages, session loss) is pushed into the sink,
//!   from whatever thread the platform calls back on
//!
//! # Example
//!
//! ```ignore
//! let (sink, mut events) = EventSink::channel();
//! let transport = MockTransport::new();
//! transport.activate(sink).await?;
//! transport.send(&TelemetryMessage::tracking(true).to_bytes()?).await?;
//! let event = events.recv().await;
//! ```

mod mock;

pub use mock::MockTransport;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport does not exist in this runtime.
    #[error("transport unsupported")]
    Unsupported,

    /// No session has been activated.
    #[error("not activated")]
    NotActivated,

    /// The counterpart cannot receive messages right now.
    #[error("counterpart not reachable")]
    NotReachable,

    /// Activation was refused.
    #[error("activation failed: {0}")]
    ActivationFailed(String),

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Everything a transport can report about its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The session is active.
    Activated,
    /// The session could not be activated.
    ActivationFailed(String),
    /// The counterpart became reachable or unreachable.
    ReachabilityChanged(bool),
    /// Bytes arrived from the counterpart.
    Received(Vec<u8>),
    /// The platform invalidated the session.
    Deactivated,
}

/// Thread-safe handle a transport uses to report events.
///
/// Emitting never blocks, so it is safe from any callback context.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl EventSink {
    /// Create a sink and the receiver the owner task reads from.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report an event. Returns `false` if nobody is listening anymore.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Transport trait for moving telemetry messages between the two devices.
///
/// Implementations wrap the platform's paired-device messaging.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Check whether the transport exists in this runtime.
    fn is_supported(&self) -> bool;

    /// Request session activation.
    ///
    /// Confirmation is reported later as [`TransportEvent::Activated`]
    /// through `events`. Implementations keep `events` for the lifetime of
    /// the session and replace it on re-activation.
    async fn activate(&self, events: EventSink) -> Result<(), TransportError>;

    /// Current reachability as seen by the platform.
    fn is_reachable(&self) -> bool;

    /// Send one encoded message to the counterpart.
    ///
    /// Resolves when the platform accepted or rejected the message.
    async fn send(&self, data: &[u8]) -> Result<(), TransportError>;
}
