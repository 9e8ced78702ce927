//! Wiring of the store, recorder, link and gateway into one bridge.
//!
//! [`OvenBridge`] is what the binary and the HTTP layer hold. It owns one of
//! everything: one state store, one run log, one device link.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use reflow_bridge::bridge::OvenBridge;
//! use reflow_bridge::config::Config;
//! use reflow_bridge::hal::SimulatedDevice;
//!
//! # async fn run() {
//! let bridge = Arc::new(OvenBridge::new(&Config::default()));
//! let token = CancellationToken::new();
//! let device = SimulatedDevice::with_default_profile(Duration::from_millis(100));
//! let link_task = bridge.spawn_link(device, token.clone());
//!
//! // ... serve HTTP ...
//!
//! token.cancel();
//! let _ = link_task.await;
//! # }
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::config::Config;
use crate::error::LinkError;
use crate::gateway::CommandGateway;
use crate::link::SerialLink;
use crate::protocol::parse_line;
use crate::runlog::RunLogRecorder;
use crate::state::{OvenStateStore, SampleApplied};
use crate::traits::{Clock, CommandLink, LineDevice, SystemClock};

/// Ingestion path for telemetry lines.
///
/// Parses a line, applies it to the store, then lets the recorder see the
/// result. The store lock is released before the run-log lock is taken.
#[derive(Debug)]
pub struct TelemetryIngest {
    store: Arc<OvenStateStore>,
    recorder: Arc<RunLogRecorder>,
}

impl TelemetryIngest {
    /// Ingest into `store` and `recorder`.
    pub fn new(store: Arc<OvenStateStore>, recorder: Arc<RunLogRecorder>) -> Self {
        Self { store, recorder }
    }

    /// The store samples are applied to.
    pub fn store(&self) -> &Arc<OvenStateStore> {
        &self.store
    }

    /// The recorder samples are shown to.
    pub fn recorder(&self) -> &Arc<RunLogRecorder> {
        &self.recorder
    }

    /// Handle one raw line. Returns what changed for a valid sample.
    pub fn ingest(&self, line: &str) -> Option<SampleApplied> {
        trace!(line, "Telemetry line");
        let Some(sample) = parse_line(line) else {
            debug!(line, "Malformed telemetry line");
            self.store.apply_raw_only(line);
            return None;
        };

        let applied = self.store.apply_sample(&sample, line);
        let observation = self.recorder.observe(&applied, line);
        if observation.started {
            info!(at = applied.elapsed_seconds, "Run log capture started");
        }
        if observation.stopped {
            info!(entries = self.recorder.len(), "Run log capture finished");
        }
        Some(applied)
    }
}

/// The complete bridge: shared state plus the device link.
pub struct OvenBridge {
    ingest: Arc<TelemetryIngest>,
    link: Arc<SerialLink>,
    gateway: CommandGateway,
}

impl OvenBridge {
    /// Bridge timed from now.
    pub fn new(config: &Config) -> Self {
        Self::with_clock(config, SystemClock::new())
    }

    /// Bridge with an explicit time source.
    pub fn with_clock(config: &Config, clock: impl Clock + 'static) -> Self {
        let store = Arc::new(OvenStateStore::with_clock(clock));
        let recorder = Arc::new(RunLogRecorder::new());
        let link = Arc::new(SerialLink::new(config.serial.retry_delay()));
        let gateway = CommandGateway::new(
            Arc::clone(&store),
            Arc::clone(&recorder),
            Arc::clone(&link) as Arc<dyn CommandLink>,
        );
        Self {
            ingest: Arc::new(TelemetryIngest::new(store, recorder)),
            link,
            gateway,
        }
    }

    /// Live state store.
    pub fn store(&self) -> &Arc<OvenStateStore> {
        self.ingest.store()
    }

    /// Run-log recorder.
    pub fn recorder(&self) -> &Arc<RunLogRecorder> {
        self.ingest.recorder()
    }

    /// Telemetry ingestion path.
    pub fn ingest(&self) -> &Arc<TelemetryIngest> {
        &self.ingest
    }

    /// Device link.
    pub fn link(&self) -> &Arc<SerialLink> {
        &self.link
    }

    /// Command gateway.
    pub fn gateway(&self) -> &CommandGateway {
        &self.gateway
    }

    /// Run the link loop over `device` on the tokio runtime until `token`
    /// is cancelled.
    pub fn spawn_link<D: LineDevice>(
        &self,
        device: D,
        token: CancellationToken,
    ) -> JoinHandle<Result<(), LinkError>> {
        let link = Arc::clone(&self.link);
        let ingest = Arc::clone(&self.ingest);
        tokio::spawn(async move { link.run(device, ingest, token).await })
    }
}
