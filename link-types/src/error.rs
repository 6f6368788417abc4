//! Error types for wire encoding.

use thiserror::Error;

/// Errors that can occur while moving telemetry over the wire.
#[derive(Debug, Error)]
pub enum WireError {
    /// MessagePack serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] rmp_serde::decode::Error),

    /// Payload was empty
    #[error("empty payload")]
    EmptyPayload,
}
