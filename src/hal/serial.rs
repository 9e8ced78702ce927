//! Physical oven controller on a serial port.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};
use tracing::debug;

use crate::error::LinkError;
use crate::protocol::decode_line;
use crate::traits::{LineDevice, LineWriter};

/// Longest line kept before it is handed on unterminated.
const MAX_LINE_BYTES: usize = 1024;

/// Serial port [`LineDevice`] backed by the `serialport` crate.
///
/// Partial lines survive read timeouts: bytes are buffered until a newline
/// arrives.
pub struct SerialDevice {
    path: String,
    baud: u32,
    timeout: Duration,
    port: Option<Box<dyn SerialPort>>,
    pending: Vec<u8>,
}

impl SerialDevice {
    /// Device at `path` opened at `baud`, each read bounded by `timeout`.
    pub fn new(path: impl Into<String>, baud: u32, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            baud,
            timeout,
            port: None,
            pending: Vec::new(),
        }
    }

    fn take_line(&mut self) -> Option<String> {
        if let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            return Some(decode_line(&raw));
        }
        if self.pending.len() >= MAX_LINE_BYTES {
            let raw = std::mem::take(&mut self.pending);
            return Some(decode_line(&raw));
        }
        None
    }
}

impl LineDevice for SerialDevice {
    fn name(&self) -> &str {
        &self.path
    }

    fn open(&mut self) -> Result<Box<dyn LineWriter>, LinkError> {
        let open_err = |e: serialport::Error| LinkError::Open {
            path: self.path.clone(),
            reason: e.to_string(),
        };

        let port = serialport::new(&self.path, self.baud)
            .timeout(self.timeout)
            .open()
            .map_err(open_err)?;

        // Junk from before we attached is not telemetry
        if let Err(e) = port.clear(ClearBuffer::Input) {
            debug!(path = %self.path, error = %e, "Could not clear serial input buffer");
        }

        let writer = port.try_clone().map_err(open_err)?;
        self.pending.clear();
        self.port = Some(port);
        Ok(Box::new(SerialWriter { port: writer }))
    }

    fn read_line(&mut self) -> Result<Option<String>, LinkError> {
        if let Some(line) = self.take_line() {
            return Ok(Some(line));
        }

        let port = self.port.as_mut().ok_or(LinkError::NotConnected)?;
        let mut buf = [0u8; 256];
        match port.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(n) => {
                self.pending.extend_from_slice(&buf[..n]);
                Ok(self.take_line())
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(LinkError::Io(e)),
        }
    }

    fn close(&mut self) {
        self.port = None;
        self.pending.clear();
    }
}

struct SerialWriter {
    port: Box<dyn SerialPort>,
}

impl LineWriter for SerialWriter {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }
}
