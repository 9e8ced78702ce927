//! Capture of one reflow cycle for export.
//!
//! The recorder decides when to record from what the oven reports, not from
//! which buttons were pressed, so a cycle started from the firmware's own
//! controls is captured too:
//!
//! | Condition | Effect |
//! |-----------|--------|
//! | inactive, phase IDLE → PREHEAT | clear buffer, fix start time, activate |
//! | active | append `(now - start, raw line)` |
//! | active, new phase IDLE and temp ≤ 60 °C | deactivate (entry kept) |
//!
//! An accepted START command also forces a fresh capture through
//! [`RunLogRecorder::force_start`].
//!
//! The buffer is unbounded: a cycle that never reaches a qualifying stop
//! keeps growing until the next start clears it.

use parking_lot::Mutex;

use crate::error::ExportError;
use crate::protocol::{parse_line, Phase};
use crate::state::SampleApplied;

/// Highest temperature at which an IDLE sample ends a capture.
pub const LOG_STOP_MAX_TEMP_C: f64 = 60.0;

/// CSV column header of the export.
pub const EXPORT_HEADER: [&str; 5] = ["t", "temp", "set", "state", "pwm"];

/// One captured telemetry line.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct RunLogEntry {
    /// Seconds since the capture started.
    pub relative_seconds: u64,
    /// The line exactly as received.
    pub raw_line: String,
}

impl RunLogEntry {
    /// Create an entry.
    pub fn new(relative_seconds: u64, raw_line: impl Into<String>) -> Self {
        Self {
            relative_seconds,
            raw_line: raw_line.into(),
        }
    }
}

/// What one call to [`RunLogRecorder::observe`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Observation {
    /// A new capture began with this sample.
    pub started: bool,
    /// The sample was appended.
    pub appended: bool,
    /// The capture ended with this sample.
    pub stopped: bool,
}

#[derive(Debug, Default)]
struct RunLog {
    entries: Vec<RunLogEntry>,
    active: bool,
    start_time: Option<u64>,
}

impl RunLog {
    fn begin(&mut self, now: u64) {
        self.entries.clear();
        self.start_time = Some(now);
        self.active = true;
    }
}

/// Owner of the single in-memory run log.
#[derive(Debug, Default)]
pub struct RunLogRecorder {
    log: Mutex<RunLog>,
}

impl RunLogRecorder {
    /// Empty, inactive recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate one applied sample.
    pub fn observe(&self, sample: &SampleApplied, raw_line: &str) -> Observation {
        let mut log = self.log.lock();
        let mut observation = Observation::default();
        let now = sample.elapsed_seconds;

        if !log.active && sample.previous_phase == Phase::Idle && sample.phase == Phase::Preheat {
            log.begin(now);
            observation.started = true;
        }

        if log.active {
            let start = *log.start_time.get_or_insert(now);
            log.entries
                .push(RunLogEntry::new(now.saturating_sub(start), raw_line));
            observation.appended = true;

            if sample.phase == Phase::Idle && sample.temperature <= LOG_STOP_MAX_TEMP_C {
                log.active = false;
                observation.stopped = true;
            }
        }

        observation
    }

    /// Start a fresh capture now regardless of phase.
    pub fn force_start(&self, now: u64) {
        self.log.lock().begin(now);
    }

    /// Whether samples are currently being captured.
    pub fn is_active(&self) -> bool {
        self.log.lock().active
    }

    /// Elapsed seconds at which the current capture started.
    pub fn start_time(&self) -> Option<u64> {
        self.log.lock().start_time
    }

    /// Number of captured entries.
    pub fn len(&self) -> usize {
        self.log.lock().entries.len()
    }

    /// Whether nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.log.lock().entries.is_empty()
    }

    /// Copy of the captured entries in order.
    pub fn entries(&self) -> Vec<RunLogEntry> {
        self.log.lock().entries.clone()
    }

    /// Render the capture as CSV (`t,temp,set,state,pwm`).
    ///
    /// Columns other than `t` are re-extracted from each stored raw line;
    /// fields the line did not carry are left blank.
    pub fn export_csv(&self) -> Result<String, ExportError> {
        let entries = self.entries();
        render_csv(&entries)
    }
}

/// Render entries as export CSV.
pub fn render_csv(entries: &[RunLogEntry]) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(&mut buf);

        writer.write_record(EXPORT_HEADER)?;
        for entry in entries {
            writer.write_record(export_row(entry))?;
        }
        writer.flush()?;
    }
    Ok(String::from_utf8(buf)?)
}

fn export_row(entry: &RunLogEntry) -> [String; 5] {
    let t = entry.relative_seconds.to_string();
    let Some(sample) = parse_line(&entry.raw_line) else {
        return [t, String::new(), String::new(), String::new(), String::new()];
    };
    [
        t,
        sample.temperature.to_string(),
        sample.setpoint.map(|v| v.to_string()).unwrap_or_default(),
        sample
            .phase
            .map(|p| p.as_str().to_string())
            .unwrap_or_default(),
        sample.pwm_percent.map(|v| v.to_string()).unwrap_or_default(),
    ]
}
