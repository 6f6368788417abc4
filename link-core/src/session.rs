//! Peer session state machine for wristlink.
//!
//! This module provides a pure, side-effect-free state machine for the
//! lifecycle of the session with the paired device. The state machine takes
//! events as input and produces a new state plus a list of actions to execute.
//!
//! The actual I/O (activating the transport, logging, forwarding events to
//! the owner task) is performed by link-client, not by this module.

use thiserror::Error;
use wristlink_types::TelemetryMessage;

/// Session state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The transport does not exist in this runtime. Terminal.
    Unsupported,
    /// Session created, activation not requested yet.
    NotActivated,
    /// Activation requested, waiting for the transport to confirm.
    Activating {
        /// Last reachability reported while activating.
        reachable: bool,
    },
    /// Transport confirmed the session.
    Activated {
        /// Whether the counterpart can currently receive messages.
        reachable: bool,
    },
}

impl SessionState {
    /// Create a new state machine in the NotActivated state.
    pub fn new() -> Self {
        Self::NotActivated
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (link-client)
    /// is responsible for executing the returned actions.
    pub fn on_event(self, event: SessionEvent) -> (Self, Vec<SessionAction>) {
        match (self, event) {
            // Unsupported never leaves
            (Self::Unsupported, _) => (Self::Unsupported, vec![]),

            // From NotActivated
            (Self::NotActivated, SessionEvent::ActivateRequested { supported: false }) => {
                (Self::Unsupported, vec![SessionAction::ReportUnsupported])
            }
            (Self::NotActivated, SessionEvent::ActivateRequested { supported: true }) => (
                Self::Activating { reachable: false },
                vec![SessionAction::StartActivation],
            ),

            // From Activating
            (Self::Activating { .. }, SessionEvent::ReachabilityChanged { reachable }) => {
                (Self::Activating { reachable }, vec![])
            }
            (Self::Activating { reachable }, SessionEvent::ActivationConfirmed) => {
                let mut actions = vec![SessionAction::Emit(LinkEvent::Activated)];
                if reachable {
                    actions.push(SessionAction::Emit(LinkEvent::ReachabilityChanged(true)));
                }
                (Self::Activated { reachable }, actions)
            }
            (Self::Activating { .. }, SessionEvent::ActivationFailed { error }) => (
                Self::NotActivated,
                vec![SessionAction::ReportActivationFailed { error }],
            ),

            // From Activated
            (Self::Activated { reachable: was }, SessionEvent::ReachabilityChanged { reachable }) => {
                let actions = if was != reachable {
                    vec![SessionAction::Emit(LinkEvent::ReachabilityChanged(reachable))]
                } else {
                    vec![]
                };
                (Self::Activated { reachable }, actions)
            }

            // Transport-level session loss
            (Self::Activating { .. }, SessionEvent::Deactivated) => {
                (Self::NotActivated, vec![SessionAction::ReportDeactivated])
            }
            (Self::Activated { reachable }, SessionEvent::Deactivated) => {
                let mut actions = Vec::new();
                if reachable {
                    actions.push(SessionAction::Emit(LinkEvent::ReachabilityChanged(false)));
                }
                actions.push(SessionAction::ReportDeactivated);
                (Self::NotActivated, actions)
            }

            // Activation is idempotent; everything else is ignored
            (state, _) => (state, vec![]),
        }
    }

    /// Check whether a send may be attempted right now.
    pub fn can_send(&self) -> Result<(), SendBlocked> {
        match self {
            Self::Activated { reachable: true } => Ok(()),
            Self::Unsupported => Err(SendBlocked::Unsupported),
            _ => Err(SendBlocked::Unreachable),
        }
    }

    /// Check if the counterpart is reachable (only meaningful once activated).
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Activated { reachable: true })
    }

    /// Check if the transport is permanently unavailable.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Events that can occur in the session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Application requested activation.
    ActivateRequested {
        /// Whether the transport exists in this runtime.
        supported: bool,
    },
    /// Transport confirmed activation.
    ActivationConfirmed,
    /// Transport refused activation.
    ActivationFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// Transport reported a reachability change.
    ReachabilityChanged {
        /// New reachability flag.
        reachable: bool,
    },
    /// Transport invalidated the session.
    Deactivated,
}

/// Why a send was refused before reaching the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendBlocked {
    /// The transport does not exist in this runtime.
    #[error("transport unsupported")]
    Unsupported,
    /// Not activated, or activated but the counterpart is unreachable.
    #[error("peer unreachable")]
    Unreachable,
}

/// Inbound events handed to the owner task.
///
/// This is the closed set of things the peer link ever tells the rest of the
/// device about.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinkEvent {
    /// The session was confirmed by the transport.
    Activated,
    /// The counterpart became reachable or unreachable.
    ReachabilityChanged(bool),
    /// A message arrived from the counterpart.
    MessageReceived(TelemetryMessage),
}

/// Actions to be executed by link-client.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Ask the transport to activate.
    StartActivation,
    /// Log that the transport is unavailable (happens once).
    ReportUnsupported,
    /// Log a refused activation.
    ReportActivationFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// The session was lost; a new activation may be started.
    ReportDeactivated,
    /// Forward an event to the owner task.
    Emit(LinkEvent),
}
