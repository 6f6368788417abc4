//! # link-types
//!
//! Wire format types for the wristlink wearable telemetry link.
//!
//! This crate provides the foundational types shared by both devices:
//! - [`Sample`], [`Vector3`] - one motion reading from the inertial sensors
//! - [`TelemetryMessage`] - the single-payload envelope moved over the peer link
//! - [`WireError`] - encode/decode failures

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod message;
mod sample;

pub use error::WireError;
pub use message::{PayloadKind, TelemetryMessage};
pub use sample::{Sample, Vector3, STANDARD_GRAVITY};
