//! Shared helpers for paired-device tests.

#![allow(dead_code)]

use std::sync::Once;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use wristlink_client::{
    DeviceRole, LinkConfig, MockTransport, NodeHandle, Sample, SensorError, SensorSource,
    TelemetryNode, Vector3,
};

/// Upper bound for anything that should happen "soon".
pub const SETTLE: Duration = Duration::from_secs(5);

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once per test binary (`RUST_LOG` filters).
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A wearable and a handheld node joined by an in-memory link.
pub struct Pair {
    pub wearable: TelemetryNode<MockTransport>,
    pub handheld: TelemetryNode<MockTransport>,
    pub wearable_link: MockTransport,
    pub handheld_link: MockTransport,
}

impl Pair {
    /// Start both nodes with default settings and wait until they see each other.
    pub async fn start() -> Self {
        Self::start_with(LinkConfig::default(), LinkConfig::default()).await
    }

    /// Start both nodes with explicit configs (roles are forced).
    pub async fn start_with(mut wearable: LinkConfig, mut handheld: LinkConfig) -> Self {
        init_test_tracing();
        wearable.device.role = DeviceRole::Wearable;
        handheld.device.role = DeviceRole::Handheld;

        let (wearable_link, handheld_link) = MockTransport::pair();
        let wearable = TelemetryNode::start(wearable, wearable_link.clone())
            .await
            .unwrap();
        let handheld = TelemetryNode::start(handheld, handheld_link.clone())
            .await
            .unwrap();

        let pair = Self {
            wearable,
            handheld,
            wearable_link,
            handheld_link,
        };
        pair.wait_reachable().await;
        pair
    }

    pub fn w(&self) -> NodeHandle {
        self.wearable.handle()
    }

    pub fn h(&self) -> NodeHandle {
        self.handheld.handle()
    }

    /// Wait until both sessions report the counterpart reachable.
    pub async fn wait_reachable(&self) {
        tokio::time::timeout(SETTLE, async {
            self.w().wait_until_reachable().await.unwrap();
            self.h().wait_until_reachable().await.unwrap();
        })
        .await
        .unwrap();
    }

    /// Flip shared reachability and wait until both sessions saw it.
    pub async fn set_reachable(&self, reachable: bool) {
        self.wearable_link.set_reachable(reachable);
        for handle in [self.w(), self.h()] {
            let mut session = handle.watch_session();
            tokio::time::timeout(SETTLE, session.wait_for(|s| s.is_reachable() == reachable))
                .await
                .unwrap()
                .unwrap();
        }
    }
}

/// Wait until `rx` satisfies `f` and return the value.
pub async fn wait_for<V: Clone>(rx: &mut watch::Receiver<V>, f: impl FnMut(&V) -> bool) -> V {
    tokio::time::timeout(SETTLE, rx.wait_for(f))
        .await
        .expect("value did not settle in time")
        .unwrap()
        .clone()
}

/// Wait until `handle` reports `expected` tracking.
pub async fn wait_tracking(handle: &NodeHandle, expected: bool) {
    let mut tracking = handle.watch_tracking();
    wait_for(&mut tracking, |v| *v == expected).await;
}

/// Sensor that always reports the same motion.
pub struct SteadySensor {
    pub acceleration: Vector3,
    pub rotation_rate: Vector3,
}

impl SensorSource for SteadySensor {
    fn read(&mut self) -> Result<Sample, SensorError> {
        Ok(Sample::now(self.acceleration, self.rotation_rate))
    }
}
