//! # link-client
//!
//! Device runtime for the wristlink telemetry link.
//!
//! This is the library each side of a wearable/handheld pair embeds to
//! stream motion metrics and keep a shared tracking flag in sync.
//!
//! ## Features
//!
//! - **Motion Sampling**: fixed-period sensor polling with non-blocking sinks
//! - **Peer Link**: activation, reachability and fire-and-forget sends over a
//!   pluggable transport (platform session, mock)
//! - **Replicated Tracking Flag**: last-writer-wins with opt-in anti-entropy
//! - **Pure State Machines**: session and replica logic live in link-core
//!
//! ## Example
//!
//! ```ignore
//! use wristlink_client::{LinkConfig, MockTransport, TelemetryNode};
//!
//! let (watch_side, phone_side) = MockTransport::pair();
//! let wearable = TelemetryNode::start(LinkConfig::default(), watch_side).await?;
//! let handheld = TelemetryNode::start(LinkConfig::default(), phone_side).await?;
//!
//! wearable.handle().toggle_local().await?;
//! let mut tracking = handheld.handle().watch_tracking();
//! tracking.wait_for(|on| *on).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod node;
pub mod peer;
pub mod sampler;
pub mod transport;

pub use config::{
    ConfigError, DeviceConfig, DeviceRole, LinkConfig, PeerConfig, SamplerConfig, SyncConfig,
};
pub use node::{NodeHandle, TelemetryNode, ToggleOutcome};
pub use peer::{LinkChannels, LinkError, PeerLink, SendOutcome, SendReport};
pub use sampler::{MotionSampler, SampleSink, SamplerHandle, SensorError, SensorSource};
pub use transport::{EventSink, MockTransport, Transport, TransportError, TransportEvent};
pub use wristlink_core::{MetricsSnapshot, SendTicket, SessionState};
pub use wristlink_types::{Sample, TelemetryMessage, Vector3};
