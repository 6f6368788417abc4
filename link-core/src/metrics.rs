//! Live metrics aggregation.
//!
//! Holds the latest value of each displayed metric. Fields are replaced
//! independently (last value wins per field) with no smoothing.

use serde::{Deserialize, Serialize};
use wristlink_types::{Sample, TelemetryMessage, STANDARD_GRAVITY};

/// Current view of every displayed metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Vertical acceleration in m/s².
    pub g_force: f64,
    /// Lateral load in m/s².
    pub lateral_g: f64,
    /// Ground speed, as reported by an external producer.
    pub speed: f64,
    /// Number of airtime moments, as reported by an external producer.
    pub airtime_count: u32,
    /// Heart rate in beats per minute.
    pub heart_rate: u32,
}

/// Owner of the [`MetricsSnapshot`].
#[derive(Debug, Clone, Default)]
pub struct MetricsAggregator {
    snapshot: MetricsSnapshot,
}

impl MetricsAggregator {
    /// Create an aggregator with every field at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot
    }

    /// Set g-force from a normalized vertical acceleration.
    pub fn update_acceleration(&mut self, z: f64) {
        self.snapshot.g_force = z * STANDARD_GRAVITY;
    }

    /// Set lateral-g from the Y rotation rate.
    pub fn update_rotation(&mut self, y: f64) {
        self.snapshot.lateral_g = y * STANDARD_GRAVITY;
    }

    /// Set the heart rate.
    pub fn update_heart_rate(&mut self, bpm: u32) {
        self.snapshot.heart_rate = bpm;
    }

    /// Set the speed.
    pub fn set_speed(&mut self, speed: f64) {
        self.snapshot.speed = speed;
    }

    /// Set the airtime count.
    pub fn set_airtime_count(&mut self, count: u32) {
        self.snapshot.airtime_count = count;
    }

    /// Apply a locally produced sample.
    pub fn record_sample(&mut self, sample: &Sample) {
        self.update_acceleration(sample.acceleration.z);
        self.update_rotation(sample.rotation_rate.y);
    }

    /// Apply a metric received from the peer.
    ///
    /// Remote metrics are already in m/s². Returns `false` for control
    /// messages, which are left untouched.
    pub fn apply_metric(&mut self, message: &TelemetryMessage) -> bool {
        match *message {
            TelemetryMessage::GForceZ(value) => {
                self.snapshot.g_force = value;
                true
            }
            TelemetryMessage::LateralG(value) => {
                self.snapshot.lateral_g = value;
                true
            }
            TelemetryMessage::IsTracking(_) => false,
        }
    }
}
