//! Replicated tracking flag.
//!
//! Each device holds one [`TrackingReplica`]. Local toggles win locally and
//! produce a control message for the peer; remote updates overwrite the
//! local value in arrival order (last-writer-wins, no timestamps).
//!
//! Concurrent toggles on both devices within one round-trip can leave the two
//! mirrors different until the next toggle. The replica can produce a full
//! state message at any time so that the caller can run anti-entropy.

use wristlink_types::TelemetryMessage;

/// Local mirror of the shared tracking flag.
///
/// Besides the value, the replica remembers whether it holds a local write
/// the counterpart never received (`unsynced`). Only such a write is pushed
/// on reconnect, so two replicas resyncing at once cannot swap values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingReplica {
    value: bool,
    unsynced: bool,
}

impl TrackingReplica {
    /// Create a replica holding `initial`.
    pub fn new(initial: bool) -> Self {
        Self {
            value: initial,
            unsynced: false,
        }
    }

    /// Current value.
    pub fn value(&self) -> bool {
        self.value
    }

    /// Check if the current value is a local write the counterpart missed.
    pub fn is_unsynced(&self) -> bool {
        self.unsynced
    }

    /// Flip the flag and return the control message announcing it.
    ///
    /// The new value is in effect as soon as this returns, whatever happens
    /// to the message.
    pub fn toggle_local(&mut self) -> TelemetryMessage {
        self.value = !self.value;
        TelemetryMessage::tracking(self.value)
    }

    /// Record that the announcement of the current value was lost.
    pub fn mark_unsynced(&mut self) {
        self.unsynced = true;
    }

    /// Record that the counterpart accepted the current value.
    pub fn mark_synced(&mut self) {
        self.unsynced = false;
    }

    /// Overwrite the flag with a value received from the peer.
    ///
    /// Any unsynced local write is superseded. Returns `true` if the value
    /// changed.
    pub fn on_remote_update(&mut self, value: bool) -> bool {
        let changed = self.value != value;
        self.value = value;
        self.unsynced = false;
        changed
    }

    /// Control message carrying the full local state.
    pub fn snapshot_message(&self) -> TelemetryMessage {
        TelemetryMessage::tracking(self.value)
    }
}

impl Default for TrackingReplica {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_off() {
        let replica = TrackingReplica::default();
        assert!(!replica.value());
        assert!(!replica.is_unsynced());
    }

    #[test]
    fn toggle_flips_and_announces_new_value() {
        let mut replica = TrackingReplica::new(false);

        assert_eq!(replica.toggle_local(), TelemetryMessage::IsTracking(true));
        assert!(replica.value());

        assert_eq!(replica.toggle_local(), TelemetryMessage::IsTracking(false));
        assert!(!replica.value());
    }

    #[test]
    fn remote_update_overwrites_unconditionally() {
        let mut replica = TrackingReplica::new(false);
        replica.toggle_local();

        assert!(replica.on_remote_update(false));
        assert!(!replica.value());
    }

    #[test]
    fn last_arrival_wins() {
        let mut replica = TrackingReplica::new(false);
        replica.on_remote_update(true);
        replica.on_remote_update(false);

        assert!(!replica.value());
    }

    #[test]
    fn identical_remote_update_reports_no_change() {
        let mut replica = TrackingReplica::new(true);
        assert!(!replica.on_remote_update(true));
        assert!(replica.value());
    }

    #[test]
    fn replicas_converge_when_messages_arrive() {
        let mut watch = TrackingReplica::default();
        let mut phone = TrackingReplica::default();

        for _ in 0..5 {
            let msg = watch.toggle_local();
            if let TelemetryMessage::IsTracking(v) = msg {
                phone.on_remote_update(v);
            }
            assert_eq!(watch.value(), phone.value());
        }
    }

    #[test]
    fn concurrent_toggles_can_diverge() {
        // Both sides toggle before either message arrives.
        let mut watch = TrackingReplica::default();
        let mut phone = TrackingReplica::default();

        let from_watch = watch.toggle_local();
        let from_phone = phone.toggle_local();

        if let TelemetryMessage::IsTracking(v) = from_phone {
            watch.on_remote_update(v);
        }
        if let TelemetryMessage::IsTracking(v) = from_watch {
            phone.on_remote_update(v);
        }

        // Both ended up on true here, but only because both toggled from false.
        assert_eq!(watch.value(), phone.value());

        // A dropped message is what actually breaks convergence.
        let _lost = watch.toggle_local();
        assert_ne!(watch.value(), phone.value());

        // Anti-entropy repairs it.
        if let TelemetryMessage::IsTracking(v) = watch.snapshot_message() {
            phone.on_remote_update(v);
        }
        assert_eq!(watch.value(), phone.value());
    }

    // ===========================================
    // Unsynced writes
    // ===========================================

    #[test]
    fn lost_write_stays_unsynced_until_delivered() {
        let mut replica = TrackingReplica::default();
        replica.toggle_local();
        replica.mark_unsynced();
        assert!(replica.is_unsynced());

        replica.mark_synced();
        assert!(!replica.is_unsynced());
    }

    #[test]
    fn remote_update_supersedes_unsynced_write() {
        let mut replica = TrackingReplica::default();
        replica.toggle_local();
        replica.mark_unsynced();

        replica.on_remote_update(false);

        assert!(!replica.is_unsynced());
        assert!(!replica.value());
    }

    #[test]
    fn only_unsynced_side_repairs_divergence() {
        let mut watch = TrackingReplica::default();
        let mut phone = TrackingReplica::default();

        // Watch toggles while the phone is away
        watch.toggle_local();
        watch.mark_unsynced();

        // On reconnect only the side holding the lost write pushes
        assert!(!phone.is_unsynced());
        assert!(watch.is_unsynced());
        if let TelemetryMessage::IsTracking(v) = watch.snapshot_message() {
            phone.on_remote_update(v);
        }
        watch.mark_synced();

        assert!(watch.value());
        assert_eq!(watch.value(), phone.value());
    }
}
