//! Device abstractions for the serial link.
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`LineDevice`] | Opens the device and yields telemetry lines |
//! | [`LineWriter`] | Outbound half of an open device |
//! | [`CommandLink`] | What the command gateway sends through |
//!
//! Implementations live in [`crate::hal`]: a real serial port, a simulated
//! fixture player, and scripted mocks for tests. The link task cannot tell
//! them apart.

use crate::error::LinkError;
use crate::protocol::DeviceCommand;

/// A line-oriented device the link task can drive.
///
/// All methods may block. The link task calls them from a blocking thread,
/// never from an async worker.
pub trait LineDevice: Send + 'static {
    /// Short human-readable name for logs (port path, "simulated", ...).
    fn name(&self) -> &str;

    /// Open the device, discard stale input and return the outbound writer.
    fn open(&mut self) -> Result<Box<dyn LineWriter>, LinkError>;

    /// Read the next line.
    ///
    /// Returns `Ok(None)` when the read timed out without a complete line.
    /// A timeout is not an error.
    fn read_line(&mut self) -> Result<Option<String>, LinkError>;

    /// Release the device handle. Safe to call when not open.
    fn close(&mut self);
}

/// Outbound half of an open device.
pub trait LineWriter: Send {
    /// Write one encoded command line.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError>;
}

/// Anything the command gateway can hand a command to.
pub trait CommandLink: Send + Sync {
    /// Transmit one command. Fails immediately when no device is open.
    fn send(&self, command: &DeviceCommand) -> Result<(), LinkError>;
}
