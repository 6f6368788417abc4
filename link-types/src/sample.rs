//! Motion samples produced by the inertial sensors.

use serde::{Deserialize, Serialize};

/// Conversion factor from normalized acceleration (g) to m/s².
pub const STANDARD_GRAVITY: f64 = 9.81;

/// A 3-axis reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    /// X axis
    pub x: f64,
    /// Y axis
    pub y: f64,
    /// Z axis
    pub z: f64,
}

impl Vector3 {
    /// Create a vector from its components.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// One timestamped motion reading.
///
/// Acceleration is in normalized g units (gravity removed), rotation rate
/// in rad/s. Samples are never mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Unix timestamp in milliseconds
    pub timestamp_ms: u64,
    /// User acceleration
    pub acceleration: Vector3,
    /// Rotation rate
    pub rotation_rate: Vector3,
}

impl Sample {
    /// Create a sample with an explicit timestamp.
    pub fn new(timestamp_ms: u64, acceleration: Vector3, rotation_rate: Vector3) -> Self {
        Self {
            timestamp_ms,
            acceleration,
            rotation_rate,
        }
    }

    /// Create a sample stamped with the current wall clock.
    pub fn now(acceleration: Vector3, rotation_rate: Vector3) -> Self {
        let timestamp_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self::new(timestamp_ms, acceleration, rotation_rate)
    }

    /// Vertical acceleration in m/s².
    pub fn g_force_z(&self) -> f64 {
        self.acceleration.z * STANDARD_GRAVITY
    }

    /// Lateral load derived from the Y rotation rate.
    pub fn lateral_g(&self) -> f64 {
        self.rotation_rate.y * STANDARD_GRAVITY
    }
}
