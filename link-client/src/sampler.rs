//! Motion sampler.
//!
//! Polls a [`SensorSource`] at a fixed period and pushes every reading into a
//! [`SampleSink`]. Sinks must not block: a slow consumer drops samples rather
//! than stalling the tick loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use wristlink_types::{Sample, TelemetryMessage};

use crate::config::SamplerConfig;
use crate::peer::{LinkError, PeerLink};
use crate::transport::Transport;

/// Sensor errors.
#[derive(Debug, Error)]
pub enum SensorError {
    /// The motion sensor cannot deliver readings.
    #[error("sensor unavailable: {0}")]
    Unavailable(String),
}

/// Inertial sensor the sampler polls.
pub trait SensorSource: Send + 'static {
    /// Power the sensor up. Called once before the first read.
    fn start(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    /// Take one reading.
    fn read(&mut self) -> Result<Sample, SensorError>;

    /// Power the sensor down.
    fn stop(&mut self) {}
}

/// Consumer of samples. Must return without waiting.
pub trait SampleSink: Send + Sync + 'static {
    /// Take one sample.
    fn accept(&self, sample: Sample);

    /// Check if nobody will ever consume samples again. Sampling ends then.
    fn is_closed(&self) -> bool {
        false
    }
}

impl SampleSink for mpsc::Sender<Sample> {
    fn accept(&self, sample: Sample) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.try_send(sample) {
            tracing::trace!("sample channel full, dropping sample");
        }
    }

    fn is_closed(&self) -> bool {
        mpsc::Sender::is_closed(self)
    }
}

impl SampleSink for Vec<Box<dyn SampleSink>> {
    fn accept(&self, sample: Sample) {
        for sink in self {
            sink.accept(sample);
        }
    }

    fn is_closed(&self) -> bool {
        self.iter().all(|sink| sink.is_closed())
    }
}

/// Forwards each sample's metrics to the counterpart.
impl<T: Transport> SampleSink for PeerLink<T> {
    fn accept(&self, sample: Sample) {
        for message in TelemetryMessage::metrics_for(&sample) {
            match self.send(message) {
                Ok(_) => {}
                Err(LinkError::PeerUnreachable | LinkError::TransportUnsupported) => {
                    tracing::trace!("counterpart unavailable, {} not forwarded", message.key());
                }
                Err(e) => tracing::debug!("failed to forward {}: {}", message.key(), e),
            }
        }
    }

    fn is_closed(&self) -> bool {
        PeerLink::is_closed(self)
    }
}

/// Periodic sampler over one sensor.
pub struct MotionSampler<S> {
    source: S,
    period: Duration,
}

impl<S: SensorSource> MotionSampler<S> {
    /// Create a sampler with an explicit period (minimum 1 ms).
    pub fn new(source: S, period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        Self { source, period }
    }

    /// Create a sampler using the configured period.
    pub fn from_config(source: S, config: &SamplerConfig) -> Self {
        Self::new(source, config.period())
    }

    /// Sampling period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start sampling into `sink`.
    ///
    /// Sensor failures are logged and end sampling; they are never returned
    /// here. Must be called within a tokio runtime.
    pub fn start<K: SampleSink>(self, sink: K) -> SamplerHandle {
        let shared = Arc::new(Shared {
            active: Mutex::new(true),
            wake: Notify::new(),
            produced: AtomicU64::new(0),
        });
        let task = tokio::spawn(run(self.source, self.period, sink, Arc::clone(&shared)));
        SamplerHandle { shared, task }
    }
}

struct Shared {
    // Held while a sample is handed to the sink, so stop() is a barrier
    active: Mutex<bool>,
    wake: Notify,
    produced: AtomicU64,
}

impl Shared {
    fn active(&self) -> MutexGuard<'_, bool> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop(&self) {
        *self.active() = false;
        self.wake.notify_one();
    }
}

async fn run<S: SensorSource, K: SampleSink>(
    mut source: S,
    period: Duration,
    sink: K,
    shared: Arc<Shared>,
) {
    if let Err(e) = source.start() {
        tracing::warn!("motion sampling disabled: {}", e);
        *shared.active() = false;
        return;
    }
    tracing::debug!("motion sampler started ({:?} period)", period);

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shared.wake.notified() => break,
            _ = ticker.tick() => {}
        }

        let sample = match source.read() {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!("motion sampling stopped: {}", e);
                *shared.active() = false;
                break;
            }
        };

        {
            let mut active = shared.active();
            if !*active {
                break;
            }
            if sink.is_closed() {
                tracing::debug!("sample sink closed");
                *active = false;
                break;
            }
            sink.accept(sample);
            shared.produced.fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!("sample at {} ms", sample.timestamp_ms);
    }

    source.stop();
    tracing::debug!(
        "motion sampler stopped after {} samples",
        shared.produced.load(Ordering::Relaxed)
    );
}

/// Handle to a running sampler. Dropping it does not stop sampling.
pub struct SamplerHandle {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl SamplerHandle {
    /// Stop scheduling ticks. No sample reaches the sink after this returns.
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub(crate) fn stopper(&self) -> SamplerStop {
        SamplerStop(Arc::clone(&self.shared))
    }

    /// Number of samples handed to the sink so far.
    pub fn produced(&self) -> u64 {
        self.shared.produced.load(Ordering::Relaxed)
    }

    /// Check if samples are still being produced.
    pub fn is_running(&self) -> bool {
        *self.shared.active() && !self.task.is_finished()
    }

    /// Wait for the sampling task to exit.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::warn!("motion sampler task failed: {}", e);
        }
    }
}

/// Stops a sampler from outside its handle.
pub(crate) struct SamplerStop(Arc<Shared>);

impl SamplerStop {
    pub(crate) fn stop(&self) {
        self.0.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use wristlink_types::Vector3;

    /// Sensor returning a fixed reading; fails after `fail_after` reads.
    struct FakeSensor {
        reads: Arc<AtomicUsize>,
        fail_after: Option<usize>,
        fail_start: bool,
    }

    impl FakeSensor {
        fn new() -> (Self, Arc<AtomicUsize>) {
            let reads = Arc::new(AtomicUsize::new(0));
            let sensor = Self {
                reads: Arc::clone(&reads),
                fail_after: None,
                fail_start: false,
            };
            (sensor, reads)
        }
    }

    impl SensorSource for FakeSensor {
        fn start(&mut self) -> Result<(), SensorError> {
            if self.fail_start {
                return Err(SensorError::Unavailable("no accelerometer".into()));
            }
            Ok(())
        }

        fn read(&mut self) -> Result<Sample, SensorError> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail_after.is_some_and(|limit| n >= limit) {
                return Err(SensorError::Unavailable("sensor went away".into()));
            }
            Ok(Sample::new(
                n as u64 * 10,
                Vector3::new(0.0, 0.0, 1.0),
                Vector3::new(0.0, 0.5, 0.0),
            ))
        }
    }

    const PERIOD: Duration = Duration::from_millis(10);

    // ===========================================
    // Ticking
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn stop_after_n_ticks_yields_exactly_n() {
        let (sensor, _) = FakeSensor::new();
        let (tx, mut rx) = mpsc::channel(64);
        let handle = MotionSampler::new(sensor, PERIOD).start(tx);

        for _ in 0..5 {
            rx.recv().await.unwrap();
        }
        handle.stop();

        tokio::time::sleep(PERIOD * 10).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(handle.produced(), 5);
        assert!(!handle.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn samples_arrive_in_order() {
        let (sensor, _) = FakeSensor::new();
        let (tx, mut rx) = mpsc::channel(64);
        let handle = MotionSampler::new(sensor, PERIOD).start(tx);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(second.timestamp_ms > first.timestamp_ms);
        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn full_sink_drops_instead_of_blocking() {
        let (sensor, reads) = FakeSensor::new();
        let (tx, mut rx) = mpsc::channel(1);
        let handle = MotionSampler::new(sensor, PERIOD).start(tx);

        tokio::time::sleep(PERIOD * 5).await;
        handle.stop();

        // Sensor kept ticking even though only one sample fit
        assert!(reads.load(Ordering::SeqCst) > 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    // ===========================================
    // Sensor failures
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn unavailable_sensor_stops_silently() {
        let (mut sensor, _) = FakeSensor::new();
        sensor.fail_after = Some(3);
        let (tx, mut rx) = mpsc::channel(64);
        let handle = MotionSampler::new(sensor, PERIOD).start(tx);

        tokio::time::sleep(PERIOD * 10).await;

        assert_eq!(handle.produced(), 3);
        assert!(!handle.is_running());
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 3);
        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn sensor_that_cannot_start_produces_nothing() {
        let (mut sensor, reads) = FakeSensor::new();
        sensor.fail_start = true;
        let (tx, _rx) = mpsc::channel(64);
        let handle = MotionSampler::new(sensor, PERIOD).start(tx);

        tokio::time::sleep(PERIOD * 3).await;

        assert_eq!(reads.load(Ordering::SeqCst), 0);
        assert_eq!(handle.produced(), 0);
        assert!(!handle.is_running());
    }

    // ===========================================
    // Sinks
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn fan_out_reaches_every_sink() {
        let (sensor, _) = FakeSensor::new();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let sinks: Vec<Box<dyn SampleSink>> = vec![Box::new(tx_a), Box::new(tx_b)];
        let handle = MotionSampler::new(sensor, PERIOD).start(sinks);

        let a = rx_a.recv().await.unwrap();
        let b = rx_b.recv().await.unwrap();
        assert_eq!(a, b);
        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn closed_sink_ends_sampling() {
        let (sensor, reads) = FakeSensor::new();
        let (tx, mut rx) = mpsc::channel(64);
        let handle = MotionSampler::new(sensor, PERIOD).start(tx);

        rx.recv().await.unwrap();
        drop(rx);
        tokio::time::sleep(PERIOD * 5).await;

        assert!(!handle.is_running());
        assert_eq!(handle.produced(), 1);
        let reads_at_stop = reads.load(Ordering::SeqCst);
        tokio::time::sleep(PERIOD * 5).await;
        assert_eq!(reads.load(Ordering::SeqCst), reads_at_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn stopper_stops_like_handle() {
        let (sensor, _) = FakeSensor::new();
        let (tx, mut rx) = mpsc::channel(64);
        let handle = MotionSampler::new(sensor, PERIOD).start(tx);

        rx.recv().await.unwrap();
        handle.stopper().stop();
        tokio::time::sleep(PERIOD * 5).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(handle.produced(), 1);
        assert!(!handle.is_running());
    }

    #[test]
    fn period_comes_from_config() {
        let (sensor, _) = FakeSensor::new();
        let config = SamplerConfig { interval_ms: 25 };
        let sampler = MotionSampler::from_config(sensor, &config);
        assert_eq!(sampler.period(), Duration::from_millis(25));
    }
}
