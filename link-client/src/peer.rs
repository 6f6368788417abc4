//! PeerLink - the session with the paired device.
//!
//! [`PeerLink`] drives the pure session state machine from link-core against
//! a real [`Transport`]:
//!
//! ```text
//! send() ──► Outbox ──► delivery worker ──► Transport ──► counterpart
//!                              │
//!                              ▼
//!                          SendReport
//!
//! Transport ──► EventSink ──► owner task ──► on_transport_event() ──► LinkEvent
//! ```
//!
//! One `PeerLink` exists per process. It is cheap to clone; clones share
//! the same session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use wristlink_core::{
    LinkEvent, Outbox, PushOutcome, SendBlocked, SendTicket, SessionAction, SessionEvent,
    SessionState,
};
use wristlink_types::{TelemetryMessage, WireError};

use crate::config::PeerConfig;
use crate::transport::{EventSink, Transport, TransportEvent};

/// Link errors.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The transport does not exist in this runtime; the device runs local-only.
    #[error("transport unsupported")]
    TransportUnsupported,

    /// The counterpart is not reachable (or the session is not activated).
    #[error("peer unreachable")]
    PeerUnreachable,

    /// An accepted send could not be delivered.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The transport refused activation.
    #[error("activation failed: {0}")]
    ActivationFailed(String),

    /// Message could not be encoded.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// The owner task is no longer running.
    #[error("node stopped")]
    NodeStopped,
}

/// Final state of an accepted send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The transport accepted the message.
    Delivered,
    /// The transport rejected the message.
    Failed(String),
    /// A newer control message replaced it before delivery.
    Superseded,
    /// Evicted from a full outbox, or discarded when the session was lost.
    Dropped,
}

/// Asynchronous report for one [`SendTicket`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    /// Ticket returned by [`PeerLink::send`].
    pub ticket: SendTicket,
    /// What happened to it.
    pub outcome: SendOutcome,
}

impl SendReport {
    /// The failure as a [`LinkError`], if the send failed.
    pub fn error(&self) -> Option<LinkError> {
        match &self.outcome {
            SendOutcome::Failed(reason) => Some(LinkError::SendFailed(reason.clone())),
            _ => None,
        }
    }
}

/// Receivers the owner task consumes.
#[derive(Debug)]
pub struct LinkChannels {
    /// Everything the transport reports.
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
    /// Delivery outcomes.
    pub reports: mpsc::UnboundedReceiver<SendReport>,
}

/// The session with the paired device.
pub struct PeerLink<T: Transport> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    transport: T,
    config: PeerConfig,
    session: watch::Sender<SessionState>,
    outbox: Mutex<Outbox>,
    wake: Notify,
    events: EventSink,
    reports: mpsc::UnboundedSender<SendReport>,
}

impl<T: Transport> Clone for PeerLink<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> PeerLink<T> {
    /// Create the link. Nothing happens on the transport until [`activate`].
    ///
    /// [`activate`]: PeerLink::activate
    pub fn new(transport: T, config: &PeerConfig) -> (Self, LinkChannels) {
        let (events, events_rx) = EventSink::channel();
        let (reports, reports_rx) = mpsc::unbounded_channel();
        let (session, _) = watch::channel(SessionState::new());

        let link = Self {
            inner: Arc::new(Inner {
                transport,
                config: config.clone(),
                session,
                outbox: Mutex::new(Outbox::new(config.outbox_capacity)),
                wake: Notify::new(),
                events,
                reports,
            }),
        };
        let channels = LinkChannels {
            events: events_rx,
            reports: reports_rx,
        };
        (link, channels)
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.inner.session.borrow()
    }

    /// Observe session state changes.
    pub fn watch_session(&self) -> watch::Receiver<SessionState> {
        self.inner.session.subscribe()
    }

    /// Synchronous reachability check.
    pub fn is_reachable(&self) -> bool {
        self.state().is_reachable()
    }

    /// Number of accepted sends not yet handed to the transport.
    pub fn pending(&self) -> usize {
        self.outbox().len()
    }

    /// Check if the owner task stopped consuming this link's reports.
    pub fn is_closed(&self) -> bool {
        self.inner.reports.is_closed()
    }

    /// Request activation. Idempotent.
    ///
    /// Returns once the transport accepted the request; confirmation arrives
    /// later as a transport event.
    pub async fn activate(&self) -> Result<(), LinkError> {
        let supported = self.inner.transport.is_supported();
        let actions = self.apply(SessionEvent::ActivateRequested { supported });

        for action in actions {
            match action {
                SessionAction::StartActivation => {
                    tracing::debug!("activating peer session");
                    if let Err(e) = self.inner.transport.activate(self.inner.events.clone()).await {
                        let error = e.to_string();
                        self.apply(SessionEvent::ActivationFailed {
                            error: error.clone(),
                        });
                        tracing::warn!("peer session activation failed: {}", error);
                        return Err(LinkError::ActivationFailed(error));
                    }
                }
                SessionAction::ReportUnsupported => {
                    tracing::warn!("paired-device transport unsupported, telemetry link disabled");
                }
                _ => {}
            }
        }

        if self.state().is_unsupported() {
            return Err(LinkError::TransportUnsupported);
        }
        Ok(())
    }

    /// Queue a message for the counterpart.
    ///
    /// Never blocks. Fails immediately unless the session is activated and
    /// the counterpart reachable; rejected messages are not queued or
    /// retried. The delivery outcome is reported asynchronously.
    pub fn send(&self, message: TelemetryMessage) -> Result<SendTicket, LinkError> {
        match self.state().can_send() {
            Ok(()) => {}
            Err(SendBlocked::Unsupported) => return Err(LinkError::TransportUnsupported),
            Err(SendBlocked::Unreachable) => return Err(LinkError::PeerUnreachable),
        }

        let payload = message.to_bytes()?;
        let (ticket, outcome) = self.outbox().push(message.kind(), payload);

        match outcome {
            PushOutcome::Queued => {}
            PushOutcome::Superseded { replaced } => {
                self.report(replaced, SendOutcome::Superseded);
            }
            PushOutcome::Evicted { dropped } => {
                tracing::trace!("outbox full, dropped {}", dropped);
                self.report(dropped, SendOutcome::Dropped);
            }
        }

        self.inner.wake.notify_one();
        Ok(ticket)
    }

    /// Single dispatch entry point for transport events.
    ///
    /// Must be called from the owner task. Updates the session and returns
    /// the events the rest of the device should see.
    pub async fn on_transport_event(&self, event: TransportEvent) -> Vec<LinkEvent> {
        let session_event = match event {
            TransportEvent::Activated => SessionEvent::ActivationConfirmed,
            TransportEvent::ActivationFailed(error) => SessionEvent::ActivationFailed { error },
            TransportEvent::ReachabilityChanged(reachable) => {
                SessionEvent::ReachabilityChanged { reachable }
            }
            TransportEvent::Deactivated => SessionEvent::Deactivated,
            TransportEvent::Received(bytes) => {
                return match TelemetryMessage::from_bytes(&bytes) {
                    Ok(message) => vec![LinkEvent::MessageReceived(message)],
                    Err(e) => {
                        tracing::warn!("discarding undecodable message ({} bytes): {}", bytes.len(), e);
                        vec![]
                    }
                };
            }
        };

        let mut emitted = Vec::new();
        let mut reactivate = false;
        for action in self.apply(session_event) {
            match action {
                SessionAction::Emit(event) => emitted.push(event),
                SessionAction::ReportActivationFailed { error } => {
                    tracing::warn!("peer session activation failed: {}", error);
                }
                SessionAction::ReportDeactivated => {
                    tracing::info!("peer session deactivated");
                    // Nothing accepted for the lost session is replayed later
                    let dropped = self.outbox().clear();
                    for ticket in dropped {
                        self.report(ticket, SendOutcome::Dropped);
                    }
                    reactivate = self.inner.config.reactivate_on_deactivation;
                }
                _ => {}
            }
        }

        if reactivate {
            if let Err(e) = self.activate().await {
                tracing::warn!("peer session re-activation failed: {}", e);
            }
        }
        emitted
    }

    /// Spawn the worker that hands queued messages to the transport.
    pub fn spawn_delivery(&self) -> JoinHandle<()> {
        let link = self.clone();
        tokio::spawn(async move { link.run_delivery().await })
    }

    async fn run_delivery(self) {
        loop {
            self.inner.wake.notified().await;

            loop {
                let next = self.outbox().pop();
                let Some(item) = next else { break };

                let outcome = match self.inner.transport.send(&item.payload).await {
                    Ok(()) => SendOutcome::Delivered,
                    Err(e) => {
                        tracing::warn!("send {} failed: {}", item.ticket, e);
                        SendOutcome::Failed(e.to_string())
                    }
                };
                self.report(item.ticket, outcome);
            }
        }
    }

    fn apply(&self, event: SessionEvent) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        self.inner.session.send_if_modified(|state| {
            let (next, produced) = state.on_event(event);
            actions = produced;
            let changed = next != *state;
            *state = next;
            changed
        });
        actions
    }

    fn report(&self, ticket: SendTicket, outcome: SendOutcome) {
        // The owner task may already be gone during shutdown
        let _ = self.inner.reports.send(SendReport { ticket, outcome });
    }

    fn outbox(&self) -> MutexGuard<'_, Outbox> {
        self.inner
            .outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
