//! TelemetryNode - one device's half of the telemetry link.
//!
//! A node owns the replicated tracking flag and the metrics snapshot. Every
//! write to either goes through a single owner task:
//!
//! ```text
//! Transport events ─┐
//! Local samples ────┤
//! NodeHandle calls ─┼──► owner task ──► TrackingReplica / MetricsAggregator
//! Send reports ─────┤                         │
//! Anti-entropy tick ┘                         ▼
//!                                     watch channels (read side)
//! ```
//!
//! Readers never lock anything: they poll or observe the published values
//! through a [`NodeHandle`].
//!
//! # Example
//!
//! ```ignore
//! use wristlink_client::{LinkConfig, MockTransport, TelemetryNode};
//!
//! let node = TelemetryNode::start(LinkConfig::default(), MockTransport::new()).await?;
//! let handle = node.handle();
//!
//! let outcome = handle.toggle_local().await?;
//! assert!(handle.is_tracking());
//! ```

use std::sync::{Mutex, PoisonError};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use wristlink_core::{
    LinkEvent, MetricsAggregator, MetricsSnapshot, SendTicket, SessionState, TrackingReplica,
};
use wristlink_types::{PayloadKind, Sample, TelemetryMessage};

use crate::config::{ConfigError, DeviceRole, LinkConfig, SamplerConfig, SyncConfig};
use crate::peer::{LinkChannels, LinkError, PeerLink, SendOutcome, SendReport};
use crate::sampler::{MotionSampler, SampleSink, SamplerHandle, SamplerStop, SensorSource};
use crate::transport::Transport;

/// Local samples waiting for the owner task.
const SAMPLE_QUEUE: usize = 32;

/// Send reports kept for slow subscribers.
const REPORT_BACKLOG: usize = 64;

/// Result of a local toggle.
#[derive(Debug)]
pub struct ToggleOutcome {
    /// Tracking value now in effect on this device.
    pub tracking: bool,
    /// Whether the change was handed to the link. The local value holds
    /// either way.
    pub sync: Result<SendTicket, LinkError>,
}

enum Command {
    ToggleLocal {
        reply: oneshot::Sender<ToggleOutcome>,
    },
    SetHeartRate(u32),
    SetSpeed(f64),
    SetAirtimeCount(u32),
}

/// Cheap, cloneable access to a running node.
#[derive(Clone)]
pub struct NodeHandle {
    commands: mpsc::UnboundedSender<Command>,
    samples: mpsc::Sender<Sample>,
    tracking: watch::Receiver<bool>,
    metrics: watch::Receiver<MetricsSnapshot>,
    session: watch::Receiver<SessionState>,
    reports: broadcast::Sender<SendReport>,
}

impl NodeHandle {
    /// Flip the tracking flag and try to tell the counterpart.
    ///
    /// The local change always takes effect. `sync` carries the send result,
    /// e.g. [`LinkError::PeerUnreachable`] when the counterpart is away.
    pub async fn toggle_local(&self) -> Result<ToggleOutcome, LinkError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::ToggleLocal { reply })?;
        rx.await.map_err(|_| LinkError::NodeStopped)
    }

    /// Current tracking value.
    pub fn is_tracking(&self) -> bool {
        *self.tracking.borrow()
    }

    /// Current metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        *self.metrics.borrow()
    }

    /// Observe tracking changes.
    pub fn watch_tracking(&self) -> watch::Receiver<bool> {
        self.tracking.clone()
    }

    /// Observe metric changes.
    pub fn watch_metrics(&self) -> watch::Receiver<MetricsSnapshot> {
        self.metrics.clone()
    }

    /// Current peer session state.
    pub fn session_state(&self) -> SessionState {
        *self.session.borrow()
    }

    /// Observe peer session changes.
    pub fn watch_session(&self) -> watch::Receiver<SessionState> {
        self.session.clone()
    }

    /// Wait until the counterpart is reachable.
    pub async fn wait_until_reachable(&self) -> Result<(), LinkError> {
        let mut session = self.session.clone();
        session
            .wait_for(|state| state.is_reachable())
            .await
            .map(|_| ())
            .map_err(|_| LinkError::NodeStopped)
    }

    /// Receive the outcome of every accepted send from now on.
    pub fn subscribe_send_reports(&self) -> broadcast::Receiver<SendReport> {
        self.reports.subscribe()
    }

    /// Push a heart-rate reading.
    pub fn set_heart_rate(&self, bpm: u32) -> Result<(), LinkError> {
        self.command(Command::SetHeartRate(bpm))
    }

    /// Push a speed value.
    pub fn set_speed(&self, speed: f64) -> Result<(), LinkError> {
        self.command(Command::SetSpeed(speed))
    }

    /// Push an airtime count.
    pub fn set_airtime_count(&self, count: u32) -> Result<(), LinkError> {
        self.command(Command::SetAirtimeCount(count))
    }

    fn command(&self, command: Command) -> Result<(), LinkError> {
        self.commands
            .send(command)
            .map_err(|_| LinkError::NodeStopped)
    }
}

/// Records samples into this node's own metrics.
impl SampleSink for NodeHandle {
    fn accept(&self, sample: Sample) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.samples.try_send(sample) {
            tracing::trace!("owner busy, dropping local sample");
        }
    }

    fn is_closed(&self) -> bool {
        self.samples.is_closed()
    }
}

/// One device's runtime: peer link, delivery worker and owner task.
pub struct TelemetryNode<T: Transport> {
    link: PeerLink<T>,
    handle: NodeHandle,
    role: DeviceRole,
    sampler: SamplerConfig,
    samplers: Mutex<Vec<SamplerStop>>,
    tasks: Vec<JoinHandle<()>>,
}

impl<T: Transport> TelemetryNode<T> {
    /// Validate `config`, spawn the node's tasks and activate the link.
    ///
    /// A transport that is unsupported or refuses activation leaves the node
    /// running local-only; that is logged, not returned.
    pub async fn start(config: LinkConfig, transport: T) -> Result<Self, ConfigError> {
        config.validate()?;

        let (link, channels) = PeerLink::new(transport, &config.link);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (samples_tx, samples_rx) = mpsc::channel(SAMPLE_QUEUE);
        let (tracking_tx, tracking_rx) = watch::channel(false);
        let (metrics_tx, metrics_rx) = watch::channel(MetricsSnapshot::default());
        let (reports_tx, _) = broadcast::channel(REPORT_BACKLOG);

        let handle = NodeHandle {
            commands: commands_tx,
            samples: samples_tx,
            tracking: tracking_rx,
            metrics: metrics_rx,
            session: link.watch_session(),
            reports: reports_tx.clone(),
        };

        let owner = Owner {
            link: link.clone(),
            role: config.device.role,
            sync: config.sync.clone(),
            tracking: TrackingReplica::default(),
            tracking_ticket: None,
            metrics: MetricsAggregator::new(),
            tracking_tx,
            metrics_tx,
            reports: reports_tx,
        };

        let tasks = vec![
            link.spawn_delivery(),
            tokio::spawn(owner.run(channels, commands_rx, samples_rx)),
        ];

        tracing::info!("telemetry node started as {:?}", config.device.role);
        if let Err(e) = link.activate().await {
            tracing::debug!("continuing without peer link: {}", e);
        }

        Ok(Self {
            link,
            handle,
            role: config.device.role,
            sampler: config.sampler,
            samplers: Mutex::new(Vec::new()),
            tasks,
        })
    }

    /// Handle for reading state and issuing commands.
    pub fn handle(&self) -> NodeHandle {
        self.handle.clone()
    }

    /// The peer link.
    pub fn link(&self) -> &PeerLink<T> {
        &self.link
    }

    /// Start sampling `source` at the configured period.
    ///
    /// A wearable forwards each sample to the counterpart and records it
    /// locally; a handheld only records it locally. The sampler stops when
    /// the node does.
    pub fn start_sampler<S: SensorSource>(&self, source: S) -> SamplerHandle {
        let sampler = MotionSampler::from_config(source, &self.sampler);
        let handle = match self.role {
            DeviceRole::Wearable => {
                let sinks: Vec<Box<dyn SampleSink>> =
                    vec![Box::new(self.link.clone()), Box::new(self.handle.clone())];
                sampler.start(sinks)
            }
            DeviceRole::Handheld => sampler.start(self.handle.clone()),
        };
        self.samplers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle.stopper());
        handle
    }

    /// Stop the node's samplers and tasks. In-flight transport sends are
    /// abandoned.
    pub fn shutdown(self) {
        tracing::info!("telemetry node shutting down");
    }
}

impl<T: Transport> Drop for TelemetryNode<T> {
    fn drop(&mut self) {
        let samplers = self.samplers.get_mut().unwrap_or_else(PoisonError::into_inner);
        for sampler in samplers.drain(..) {
            sampler.stop();
        }
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Sole writer of the replicated and aggregated state.
struct Owner<T: Transport> {
    link: PeerLink<T>,
    role: DeviceRole,
    sync: SyncConfig,
    tracking: TrackingReplica,
    // Latest accepted send carrying the tracking value
    tracking_ticket: Option<SendTicket>,
    metrics: MetricsAggregator,
    tracking_tx: watch::Sender<bool>,
    metrics_tx: watch::Sender<MetricsSnapshot>,
    reports: broadcast::Sender<SendReport>,
}

impl<T: Transport> Owner<T> {
    async fn run(
        mut self,
        mut channels: LinkChannels,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut samples: mpsc::Receiver<Sample>,
    ) {
        let mut anti_entropy = self.sync.anti_entropy_period().map(|period| {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        loop {
            tokio::select! {
                Some(event) = channels.events.recv() => {
                    for event in self.link.on_transport_event(event).await {
                        self.dispatch(event);
                    }
                }
                Some(command) = commands.recv() => self.handle_command(command),
                Some(sample) = samples.recv() => {
                    self.metrics.record_sample(&sample);
                    self.publish_metrics();
                }
                Some(report) = channels.reports.recv() => self.handle_report(report),
                _ = next_tick(&mut anti_entropy) => {
                    // The wearable is authoritative for periodic repair
                    if self.role == DeviceRole::Wearable || self.tracking.is_unsynced() {
                        self.push_state("anti-entropy");
                    }
                }
                else => break,
            }
        }
        tracing::debug!("owner task finished");
    }

    fn dispatch(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Activated => tracing::info!("peer session activated"),
            LinkEvent::ReachabilityChanged(reachable) => {
                tracing::debug!("counterpart reachable: {}", reachable);
                if reachable && self.sync.resync_on_reconnect && self.tracking.is_unsynced() {
                    self.push_state("reconnect");
                }
            }
            LinkEvent::MessageReceived(message) => match message.kind() {
                PayloadKind::Control => {
                    if let TelemetryMessage::IsTracking(value) = message {
                        self.tracking_ticket = None;
                        if self.tracking.on_remote_update(value) {
                            tracing::debug!("tracking set to {} by counterpart", value);
                        }
                        self.publish_tracking();
                    }
                }
                PayloadKind::Metric => {
                    self.metrics.apply_metric(&message);
                    self.publish_metrics();
                }
            },
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::ToggleLocal { reply } => {
                let message = self.tracking.toggle_local();
                self.publish_tracking();

                let sync = self.link.send(message);
                match &sync {
                    Ok(ticket) => self.tracking_ticket = Some(*ticket),
                    Err(e) => {
                        tracing::debug!("tracking toggled locally only: {}", e);
                        self.tracking_ticket = None;
                        self.tracking.mark_unsynced();
                    }
                }
                // Caller may have given up waiting
                let _ = reply.send(ToggleOutcome {
                    tracking: self.tracking.value(),
                    sync,
                });
            }
            Command::SetHeartRate(bpm) => {
                self.metrics.update_heart_rate(bpm);
                self.publish_metrics();
            }
            Command::SetSpeed(speed) => {
                self.metrics.set_speed(speed);
                self.publish_metrics();
            }
            Command::SetAirtimeCount(count) => {
                self.metrics.set_airtime_count(count);
                self.publish_metrics();
            }
        }
    }

    fn handle_report(&mut self, report: SendReport) {
        tracing::trace!("send {} finished: {:?}", report.ticket, report.outcome);
        if self.tracking_ticket == Some(report.ticket) {
            match report.outcome {
                SendOutcome::Delivered => self.tracking.mark_synced(),
                SendOutcome::Failed(_) | SendOutcome::Dropped => self.tracking.mark_unsynced(),
                SendOutcome::Superseded => {}
            }
            self.tracking_ticket = None;
        }
        // No subscribers is fine
        let _ = self.reports.send(report);
    }

    /// Push the full tracking state to the counterpart.
    fn push_state(&mut self, reason: &str) {
        if !self.link.is_reachable() {
            return;
        }
        match self.link.send(self.tracking.snapshot_message()) {
            Ok(ticket) => {
                tracing::trace!("{} push queued as {}", reason, ticket);
                self.tracking_ticket = Some(ticket);
            }
            Err(e) => tracing::debug!("{} push skipped: {}", reason, e),
        }
    }

    fn publish_tracking(&self) {
        let value = self.tracking.value();
        self.tracking_tx.send_if_modified(|current| {
            let changed = *current != value;
            *current = value;
            changed
        });
    }

    fn publish_metrics(&self) {
        let snapshot = self.metrics.snapshot();
        self.metrics_tx.send_if_modified(|current| {
            let changed = *current != snapshot;
            *current = snapshot;
            changed
        });
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
