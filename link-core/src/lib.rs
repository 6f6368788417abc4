//! # link-core
//!
//! Pure logic for wristlink (no I/O, instant tests).
//!
//! This crate implements the state machines for the telemetry link without
//! any transport, sensor or timer access, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (transport, sensors, timers) is performed by `link-client`,
//! which interprets the actions produced by these state machines.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod metrics;
pub mod outbox;
pub mod session;
pub mod tracking;

pub use metrics::{MetricsAggregator, MetricsSnapshot};
pub use outbox::{Outbox, PushOutcome, QueuedSend, SendTicket};
pub use session::{LinkEvent, SendBlocked, SessionAction, SessionEvent, SessionState};
pub use tracking::TrackingReplica;
