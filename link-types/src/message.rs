//! Telemetry messages exchanged between the paired devices.
//!
//! Each message carries exactly one payload and is encoded as a single-key
//! map, so `TelemetryMessage::IsTracking(true)` travels as
//! `{"isTracking": true}`.

use serde::{Deserialize, Serialize};

use crate::{Sample, WireError};

/// The single payload of a wire message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TelemetryMessage {
    /// Vertical acceleration in m/s²
    #[serde(rename = "gForceZ")]
    GForceZ(f64),
    /// Lateral load in m/s²
    #[serde(rename = "lateralG")]
    LateralG(f64),
    /// Shared tracking flag
    #[serde(rename = "isTracking")]
    IsTracking(bool),
}

/// Routing class of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    /// Scalar metric update, routed to the metrics aggregator.
    Metric,
    /// Control flag, routed to the state reconciler.
    Control,
}

impl TelemetryMessage {
    /// Build the control message for a tracking value.
    pub fn tracking(value: bool) -> Self {
        Self::IsTracking(value)
    }

    /// The metric messages the wearable forwards for one sample.
    pub fn metrics_for(sample: &Sample) -> [Self; 2] {
        [
            Self::GForceZ(sample.g_force_z()),
            Self::LateralG(sample.lateral_g()),
        ]
    }

    /// Routing class of this message.
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::GForceZ(_) | Self::LateralG(_) => PayloadKind::Metric,
            Self::IsTracking(_) => PayloadKind::Control,
        }
    }

    /// Wire key of the payload.
    pub fn key(&self) -> &'static str {
        match self {
            Self::GForceZ(_) => "gForceZ",
            Self::LateralG(_) => "lateralG",
            Self::IsTracking(_) => "isTracking",
        }
    }

    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        rmp_serde::to_vec(self).map_err(WireError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.is_empty() {
            return Err(WireError::EmptyPayload);
        }
        rmp_serde::from_slice(bytes).map_err(WireError::Deserialization)
    }
}
