//! Connection lifecycle for the oven device.
//!
//! [`SerialLink`] owns the one device handle and runs the connection state
//! machine:
//!
//! | From | Event | To |
//! |------|-------|----|
//! | `Disconnected` | loop start | `Connecting` |
//! | `Connecting` | open ok | `Connected` |
//! | `Connecting` | open failed | `Disconnected` (after retry delay) |
//! | `Connected` | line / timeout | `Connected` |
//! | `Connected` | I/O error | `Disconnected` (after retry delay) |
//! | any | device call panicked | `Disconnected`, loop ends |
//!
//! Retries never give up on I/O errors. The loop ends when the cancellation
//! token passed to [`SerialLink::run`] fires, or when a device call panics
//! and takes the device with it.
//!
//! Device calls block, so they run on tokio's blocking pool and the async
//! workers stay free for HTTP requests.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::bridge::TelemetryIngest;
use crate::error::LinkError;
use crate::protocol::DeviceCommand;
use crate::state::OvenStateStore;
use crate::traits::{CommandLink, LineDevice, LineWriter};

/// Default pause between reconnect attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Position in the connection state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    /// No handle; about to try again.
    Disconnected,
    /// Opening the device.
    Connecting,
    /// Reading lines.
    Connected,
}

/// Owner of the device connection and its single outbound writer.
pub struct SerialLink {
    writer: Mutex<Option<Box<dyn LineWriter>>>,
    retry_delay: Duration,
}

impl SerialLink {
    /// Link that waits `retry_delay` between reconnect attempts.
    pub fn new(retry_delay: Duration) -> Self {
        Self {
            writer: Mutex::new(None),
            retry_delay,
        }
    }

    /// Whether an outbound handle is installed.
    pub fn is_open(&self) -> bool {
        self.writer.lock().is_some()
    }

    /// Write one command line.
    ///
    /// Fails immediately with [`LinkError::NotConnected`] when no device is
    /// open. A failed write drops the handle so the read loop reconnects.
    pub fn write_line(&self, command: &DeviceCommand) -> Result<(), LinkError> {
        let mut guard = self.writer.lock();
        let writer = guard.as_mut().ok_or(LinkError::NotConnected)?;
        if let Err(e) = writer.write_all(&command.encode()) {
            *guard = None;
            return Err(e);
        }
        trace!(%command, "Command written");
        Ok(())
    }

    /// Drive the connection until `token` is cancelled.
    ///
    /// Lines are handed to `ingest` in the order they were read. Returns an
    /// error only if a blocking device call panicked; the store is marked
    /// disconnected and the writer dropped before returning.
    pub async fn run<D: LineDevice>(
        &self,
        device: D,
        ingest: Arc<TelemetryIngest>,
        token: CancellationToken,
    ) -> Result<(), LinkError> {
        let store = Arc::clone(ingest.store());
        let name = device.name().to_string();
        let mut device = device;
        let mut state = LinkState::Disconnected;

        while !token.is_cancelled() {
            state = match state {
                LinkState::Disconnected => LinkState::Connecting,

                LinkState::Connecting => {
                    store.mark_connecting();
                    let (d, opened) = match blocking(device, |d| d.open()).await {
                        Ok(result) => result,
                        Err(e) => return Err(self.abandon(&name, &store, e)),
                    };
                    device = d;
                    match opened {
                        Ok(writer) => {
                            *self.writer.lock() = Some(writer);
                            store.mark_connected();
                            info!(device = %name, "Oven connected");
                            LinkState::Connected
                        }
                        Err(e) => {
                            self.teardown(&mut device, &e, &ingest);
                            if !self.backoff(&token).await {
                                break;
                            }
                            LinkState::Disconnected
                        }
                    }
                }

                LinkState::Connected => {
                    let (d, read) = match blocking(device, |d| d.read_line()).await {
                        Ok(result) => result,
                        Err(e) => return Err(self.abandon(&name, &store, e)),
                    };
                    device = d;
                    let read = match read {
                        Ok(_) if !self.is_open() => {
                            Err(LinkError::Closed("outbound write failed".into()))
                        }
                        other => other,
                    };
                    match read {
                        Ok(Some(line)) => {
                            if !line.trim().is_empty() {
                                ingest.ingest(&line);
                            }
                            LinkState::Connected
                        }
                        Ok(None) => LinkState::Connected,
                        Err(e) => {
                            self.teardown(&mut device, &e, &ingest);
                            if !self.backoff(&token).await {
                                break;
                            }
                            LinkState::Disconnected
                        }
                    }
                }
            };
        }

        *self.writer.lock() = None;
        device.close();
        store.mark_disconnected("link stopped");
        info!(device = %name, "Link stopped");
        Ok(())
    }

    fn teardown<D: LineDevice>(&self, device: &mut D, error: &LinkError, ingest: &TelemetryIngest) {
        *self.writer.lock() = None;
        device.close();
        ingest.store().mark_disconnected(&error.to_string());
        warn!(device = %device.name(), %error, retry_in_ms = self.retry_delay.as_millis() as u64, "Oven link down");
    }

    /// The device was lost with a panicked blocking task; nothing is left to
    /// close or reopen.
    fn abandon(&self, name: &str, store: &OvenStateStore, error: LinkError) -> LinkError {
        *self.writer.lock() = None;
        store.mark_disconnected(&error.to_string());
        warn!(device = %name, %error, "Oven link abandoned");
        error
    }

    /// Wait out the retry delay. Returns `false` if cancelled meanwhile.
    async fn backoff(&self, token: &CancellationToken) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.retry_delay) => true,
            _ = token.cancelled() => {
                debug!("Reconnect backoff cancelled");
                false
            }
        }
    }
}

impl Default for SerialLink {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_DELAY)
    }
}

impl CommandLink for SerialLink {
    fn send(&self, command: &DeviceCommand) -> Result<(), LinkError> {
        self.write_line(command)
    }
}

/// Run a blocking device call on the blocking pool, handing the device back.
async fn blocking<D, T, F>(device: D, f: F) -> Result<(D, Result<T, LinkError>), LinkError>
where
    D: LineDevice,
    T: Send + 'static,
    F: FnOnce(&mut D) -> Result<T, LinkError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut device = device;
        let result = f(&mut device);
        (device, result)
    })
    .await
    .map_err(|e| LinkError::Closed(format!("device task failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{MockClock, MockDevice};
    use crate::runlog::RunLogRecorder;
    use crate::state::ConnectionStatus;
    use std::sync::atomic::Ordering;

    #[test]
    fn write_without_device_fails_fast() {
        let link = SerialLink::default();
        assert!(!link.is_open());
        assert!(matches!(
            link.write_line(&DeviceCommand::Start),
            Err(LinkError::NotConnected)
        ));
    }

    #[test]
    fn write_goes_to_installed_writer() {
        let link = SerialLink::default();
        let mut device = MockDevice::new();
        *link.writer.lock() = Some(device.open().unwrap());

        link.write_line(&DeviceCommand::SetPoint(180.0)).unwrap();
        link.send(&DeviceCommand::Abort).unwrap();
        assert_eq!(device.written(), vec!["SET=180.0", "CMD=ABORT"]);
    }

    #[test]
    fn failed_write_drops_writer() {
        let link = SerialLink::default();
        let mut device = MockDevice::new();
        *link.writer.lock() = Some(device.open().unwrap());
        device.write_failure_switch().store(true, Ordering::SeqCst);

        assert!(link.write_line(&DeviceCommand::Start).is_err());
        assert!(!link.is_open());
        assert!(matches!(
            link.write_line(&DeviceCommand::Start),
            Err(LinkError::NotConnected)
        ));
    }

    fn ingest() -> Arc<TelemetryIngest> {
        Arc::new(TelemetryIngest::new(
            Arc::new(OvenStateStore::with_clock(MockClock::new())),
            Arc::new(RunLogRecorder::new()),
        ))
    }

    async fn wait_for(mut cond: impl FnMut() -> bool) {
        for _ in 0..400 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn run_ingests_lines_in_order() {
        let ingest = ingest();
        let link = Arc::new(SerialLink::new(Duration::from_millis(10)));
        let token = CancellationToken::new();
        let device = MockDevice::new()
            .line("temp=25,state=IDLE")
            .line("not telemetry")
            .timeout()
            .line("")
            .line("temp=26,state=IDLE");

        let task = {
            let link = Arc::clone(&link);
            let ingest = Arc::clone(&ingest);
            let token = token.clone();
            tokio::spawn(async move { link.run(device, ingest, token).await })
        };

        let store = Arc::clone(ingest.store());
        wait_for(|| store.snapshot().sample_sequence == 2).await;

        let state = store.snapshot();
        assert!(state.connected);
        assert_eq!(state.connection_status, ConnectionStatus::Connected);
        assert_eq!(state.temperature, Some(26.0));
        assert_eq!(state.last_raw_line, "temp=26,state=IDLE");
        assert!(link.is_open());

        token.cancel();
        task.await.unwrap().unwrap();
        assert!(!link.is_open());
        assert!(!store.snapshot().connected);
    }

    #[tokio::test]
    async fn open_failures_are_retried() {
        let ingest = ingest();
        let link = Arc::new(SerialLink::new(Duration::from_millis(5)));
        let token = CancellationToken::new();
        let device = MockDevice::new()
            .fail_open("permission denied")
            .fail_open("busy")
            .line("temp=30");
        let opens = device.open_count();

        let task = {
            let (link, ingest, token) = (Arc::clone(&link), Arc::clone(&ingest), token.clone());
            tokio::spawn(async move { link.run(device, ingest, token).await })
        };

        let store = Arc::clone(ingest.store());
        wait_for(|| store.snapshot().sample_sequence == 1).await;
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert!(store.snapshot().connected);

        token.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn read_error_disconnects_and_keeps_last_values() {
        let ingest = ingest();
        let link = Arc::new(SerialLink::new(Duration::from_millis(5)));
        let token = CancellationToken::new();
        let device = MockDevice::new()
            .line("temp=120,set=150,state=SOAK,pwm=40")
            .read_error("device unplugged")
            .refuse_reopen();

        let task = {
            let (link, ingest, token) = (Arc::clone(&link), Arc::clone(&ingest), token.clone());
            tokio::spawn(async move { link.run(device, ingest, token).await })
        };

        let store = Arc::clone(ingest.store());
        wait_for(|| {
            let s = store.snapshot();
            s.sample_sequence == 1 && !s.connected
        })
        .await;

        let state = store.snapshot();
        assert_eq!(state.pwm_percent, None);
        assert_eq!(state.temperature, Some(120.0));
        assert_eq!(state.setpoint, Some(150.0));
        assert!(state.last_raw_line.starts_with("(error: "));
        assert!(!link.is_open());

        token.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn reconnects_after_read_error() {
        let ingest = ingest();
        let link = Arc::new(SerialLink::new(Duration::from_millis(5)));
        let token = CancellationToken::new();
        let device = MockDevice::new()
            .line("temp=50")
            .read_error("usb reset")
            .line("temp=51");
        let opens = device.open_count();

        let task = {
            let (link, ingest, token) = (Arc::clone(&link), Arc::clone(&ingest), token.clone());
            tokio::spawn(async move { link.run(device, ingest, token).await })
        };

        let store = Arc::clone(ingest.store());
        wait_for(|| store.snapshot().sample_sequence == 2).await;
        assert_eq!(opens.load(Ordering::SeqCst), 2);
        assert!(store.snapshot().connected);

        token.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn panicking_device_marks_link_down() {
        let ingest = ingest();
        let link = Arc::new(SerialLink::new(Duration::from_millis(5)));
        let token = CancellationToken::new();
        let device = MockDevice::new().line("temp=80,state=SOAK").panic_on_read("driver bug");

        let result = link.run(device, Arc::clone(&ingest), token).await;
        assert!(matches!(result, Err(LinkError::Closed(_))));

        let state = ingest.store().snapshot();
        assert!(!state.connected);
        assert_eq!(state.connection_status, ConnectionStatus::Disconnected);
        assert_eq!(state.temperature, Some(80.0));
        assert!(state.last_raw_line.starts_with("(error: "));
        assert!(!link.is_open());
        assert!(matches!(
            link.write_line(&DeviceCommand::Start),
            Err(LinkError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn cancel_during_backoff_stops_promptly() {
        let ingest = ingest();
        let link = Arc::new(SerialLink::new(Duration::from_secs(3600)));
        let token = CancellationToken::new();
        let device = MockDevice::new().fail_open("no such device");

        let task = {
            let (link, ingest, token) = (Arc::clone(&link), Arc::clone(&ingest), token.clone());
            tokio::spawn(async move { link.run(device, ingest, token).await })
        };

        let store = Arc::clone(ingest.store());
        wait_for(|| store.snapshot().last_raw_line.contains("no such device")).await;

        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("link did not stop")
            .unwrap()
            .unwrap();
    }
}
