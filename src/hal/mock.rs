//! Mock implementations for testing without an oven attached.
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockClock`] | [`Clock`] | Controllable, shareable time source |
//! | [`MockDevice`] | [`LineDevice`] | Scripted telemetry, read errors and open failures |
//! | [`MockLink`] | [`CommandLink`] | Records commands, can be told to fail |
//!
//! # Example
//!
//! ```rust
//! use reflow_bridge::hal::MockDevice;
//! use reflow_bridge::traits::LineDevice;
//!
//! let mut device = MockDevice::new()
//!     .line("temp=25,state=IDLE")
//!     .timeout()
//!     .read_error("device unplugged");
//!
//! let mut writer = device.open().unwrap();
//! assert_eq!(device.read_line().unwrap().as_deref(), Some("temp=25,state=IDLE"));
//! assert_eq!(device.read_line().unwrap(), None);
//! assert!(device.read_line().is_err());
//!
//! writer.write_all(b"CMD=IDLE\n").unwrap();
//! assert_eq!(device.written(), vec!["CMD=IDLE".to_string()]);
//! ```
//!
//! [`Clock`]: crate::traits::Clock
//! [`LineDevice`]: crate::traits::LineDevice
//! [`CommandLink`]: crate::traits::CommandLink

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::LinkError;
use crate::protocol::{decode_line, DeviceCommand};
use crate::traits::{Clock, CommandLink, LineDevice, LineWriter};

// ============================================================================
// Clock
// ============================================================================

/// Mock clock for testing.
///
/// Clones share the same time, so a test can keep one handle and give
/// another to the state store.
///
/// ```rust
/// use reflow_bridge::hal::MockClock;
/// use reflow_bridge::traits::Clock;
///
/// let clock = MockClock::new();
/// let shared = clock.clone();
///
/// clock.set(1000);
/// assert_eq!(shared.now_ms(), 1000);
///
/// shared.advance(500);
/// assert_eq!(clock.now_ms(), 1500);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockClock {
    current_ms: Arc<AtomicU64>,
}

impl MockClock {
    /// Creates a new mock clock starting at 0ms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the current time in milliseconds.
    pub fn set(&self, ms: u64) {
        self.current_ms.store(ms, Ordering::SeqCst);
    }

    /// Advances time by the given milliseconds.
    pub fn advance(&self, ms: u64) {
        self.current_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Advances time by whole seconds.
    pub fn advance_secs(&self, secs: u64) {
        self.advance(secs * 1000);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.current_ms.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Device
// ============================================================================

/// One scripted read result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    /// Deliver a line.
    Line(String),
    /// Time out without a line.
    Timeout,
    /// Fail as if the device vanished.
    ReadError(String),
    /// Panic inside the driver.
    Panic(String),
}

/// Scripted [`LineDevice`].
///
/// Reads replay the script in order. Once it is exhausted, each read waits
/// a few milliseconds and times out, like an idle serial port. Commands
/// written through any writer it handed out are collected in
/// [`MockDevice::written`].
#[derive(Debug, Default)]
pub struct MockDevice {
    script: VecDeque<MockEvent>,
    open_failures: VecDeque<String>,
    refuse_reopen: bool,
    open_delay: Duration,
    is_open: bool,
    opens: Arc<AtomicUsize>,
    written: Arc<Mutex<Vec<String>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MockDevice {
    /// Empty script; opens succeed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a telemetry line.
    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.script.push_back(MockEvent::Line(line.into()));
        self
    }

    /// Queue several telemetry lines.
    pub fn lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script
            .extend(lines.into_iter().map(|l| MockEvent::Line(l.into())));
        self
    }

    /// Queue a read timeout.
    pub fn timeout(mut self) -> Self {
        self.script.push_back(MockEvent::Timeout);
        self
    }

    /// Queue a read failure.
    pub fn read_error(mut self, reason: impl Into<String>) -> Self {
        self.script.push_back(MockEvent::ReadError(reason.into()));
        self
    }

    /// Queue a driver panic.
    pub fn panic_on_read(mut self, message: impl Into<String>) -> Self {
        self.script.push_back(MockEvent::Panic(message.into()));
        self
    }

    /// Make every open attempt block for `delay` first.
    pub fn open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Make the next open attempt fail. Stacks.
    pub fn fail_open(mut self, reason: impl Into<String>) -> Self {
        self.open_failures.push_back(reason.into());
        self
    }

    /// After the first successful open, every later open fails.
    pub fn refuse_reopen(mut self) -> Self {
        self.refuse_reopen = true;
        self
    }

    /// Number of successful opens so far (shared across clones of the handle).
    pub fn open_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.opens)
    }

    /// Shared handle to the written command lines.
    pub fn written_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.written)
    }

    /// Command lines written so far, without terminators.
    pub fn written(&self) -> Vec<String> {
        self.written.lock().clone()
    }

    /// Shared switch that makes every write fail while set.
    pub fn write_failure_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail_writes)
    }
}

impl LineDevice for MockDevice {
    fn name(&self) -> &str {
        "mock"
    }

    fn open(&mut self) -> Result<Box<dyn LineWriter>, LinkError> {
        if !self.open_delay.is_zero() {
            std::thread::sleep(self.open_delay);
        }
        if let Some(reason) = self.open_failures.pop_front() {
            return Err(LinkError::Open {
                path: "mock".into(),
                reason,
            });
        }
        if self.refuse_reopen && self.opens.load(Ordering::SeqCst) > 0 {
            return Err(LinkError::Open {
                path: "mock".into(),
                reason: "no such device".into(),
            });
        }

        self.is_open = true;
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockWriter {
            written: Arc::clone(&self.written),
            fail: Arc::clone(&self.fail_writes),
        }))
    }

    fn read_line(&mut self) -> Result<Option<String>, LinkError> {
        if !self.is_open {
            return Err(LinkError::NotConnected);
        }
        match self.script.pop_front() {
            Some(MockEvent::Line(line)) => Ok(Some(line)),
            Some(MockEvent::Timeout) => Ok(None),
            Some(MockEvent::ReadError(reason)) => Err(LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                reason,
            ))),
            Some(MockEvent::Panic(message)) => panic!("{}", message),
            None => {
                std::thread::sleep(Duration::from_millis(5));
                Ok(None)
            }
        }
    }

    fn close(&mut self) {
        self.is_open = false;
    }
}

struct MockWriter {
    written: Arc<Mutex<Vec<String>>>,
    fail: Arc<AtomicBool>,
}

impl LineWriter for MockWriter {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "write failed",
            )));
        }
        self.written.lock().push(decode_line(bytes));
        Ok(())
    }
}

// ============================================================================
// Command link
// ============================================================================

/// Mock [`CommandLink`] for gateway tests.
///
/// ```rust
/// use reflow_bridge::hal::MockLink;
/// use reflow_bridge::protocol::DeviceCommand;
/// use reflow_bridge::traits::CommandLink;
///
/// let link = MockLink::new();
/// link.send(&DeviceCommand::Start).unwrap();
/// assert_eq!(link.sent(), vec![DeviceCommand::Start]);
///
/// link.set_fail(true);
/// assert!(link.send(&DeviceCommand::Abort).is_err());
/// assert_eq!(link.sent().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockLink {
    sent: Mutex<Vec<DeviceCommand>>,
    fail: AtomicBool,
}

impl MockLink {
    /// Link that accepts every command.
    pub fn new() -> Self {
        Self::default()
    }

    /// Link that rejects every command as not connected.
    pub fn failing() -> Self {
        let link = Self::default();
        link.set_fail(true);
        link
    }

    /// Toggle failure.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Commands accepted so far.
    pub fn sent(&self) -> Vec<DeviceCommand> {
        self.sent.lock().clone()
    }
}

impl CommandLink for MockLink {
    fn send(&self, command: &DeviceCommand) -> Result<(), LinkError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(LinkError::NotConnected);
        }
        self.sent.lock().push(*command);
        Ok(())
    }
}
