//! Fixture playback device ("fake mode").
//!
//! Replays telemetry lines at a fixed period, looping forever, so the whole
//! bridge can run without an oven. Commands sent to it always succeed and
//! are only logged.

use std::path::Path;
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::LinkError;
use crate::protocol::decode_line;
use crate::traits::{LineDevice, LineWriter};

/// Playback [`LineDevice`].
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    lines: Vec<String>,
    period: Duration,
    cursor: usize,
    is_open: bool,
}

impl SimulatedDevice {
    /// Play back `lines` one per `period`.
    pub fn new(lines: Vec<String>, period: Duration) -> Self {
        Self {
            lines,
            period,
            cursor: 0,
            is_open: false,
        }
    }

    /// Play back the built-in reflow profile.
    pub fn with_default_profile(period: Duration) -> Self {
        Self::new(default_profile(), period)
    }

    /// Load a fixture file. Blank lines and lines starting with `#` are skipped.
    pub fn from_file(path: impl AsRef<Path>, period: Duration) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::new(parse_fixture(&text), period))
    }

    /// Number of lines in one playback loop.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the fixture has no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl LineDevice for SimulatedDevice {
    fn name(&self) -> &str {
        "simulated"
    }

    fn open(&mut self) -> Result<Box<dyn LineWriter>, LinkError> {
        self.is_open = true;
        info!(lines = self.lines.len(), period_ms = self.period.as_millis() as u64, "Simulated oven attached");
        Ok(Box::new(SimulatedWriter))
    }

    fn read_line(&mut self) -> Result<Option<String>, LinkError> {
        if !self.is_open {
            return Err(LinkError::NotConnected);
        }
        thread::sleep(self.period);
        if self.lines.is_empty() {
            return Ok(None);
        }
        let line = self.lines[self.cursor % self.lines.len()].clone();
        self.cursor = (self.cursor + 1) % self.lines.len();
        Ok(Some(line))
    }

    fn close(&mut self) {
        self.is_open = false;
    }
}

struct SimulatedWriter;

impl LineWriter for SimulatedWriter {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        debug!(command = %decode_line(bytes), "Simulated oven received command");
        Ok(())
    }
}

/// Fixture lines from text, skipping blanks and `#` comments.
pub fn parse_fixture(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// A complete cycle: idle, preheat, soak, ramp, reflow, cooling, idle.
///
/// Temperatures follow a typical lead-free profile at one sample per step.
pub fn default_profile() -> Vec<String> {
    let mut lines = Vec::new();
    let mut push = |temp: f64, set: f64, state: &str, pwm: u8, mode: &str| {
        lines.push(format!(
            "temp={:.1},set={:.1},state={},pwm={},mode={}",
            temp, set, state, pwm, mode
        ));
    };

    for _ in 0..5 {
        push(25.0, 150.0, "IDLE", 0, "IDLE");
    }
    // 25 -> 150 at 2.5 °C/s
    for step in 0..=50 {
        push(25.0 + 2.5 * step as f64, 150.0, "PREHEAT", 100, "RUN");
    }
    // 150 -> 180 over 60 s
    for step in 0..=60 {
        push(150.0 + 0.5 * step as f64, 180.0, "SOAK", 35, "RUN");
    }
    // 180 -> 217
    for step in 0..=37 {
        push(180.0 + step as f64, 217.0, "RAMP", 90, "RUN");
    }
    // Peak at 245 and back to 217
    for step in 0..=28 {
        push(217.0 + step as f64, 245.0, "REFLOW", 100, "RUN");
    }
    for step in 0..=28 {
        push(245.0 - step as f64, 245.0, "REFLOW", 20, "RUN");
    }
    // 217 -> 61 at 3 °C/s
    for step in 0..=52 {
        push(217.0 - 3.0 * step as f64, 25.0, "COOLING", 0, "IDLE");
    }
    for step in 0..10 {
        push(55.0 - 3.0 * step as f64, 25.0, "IDLE", 0, "IDLE");
    }

    lines
}
