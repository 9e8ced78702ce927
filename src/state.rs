//! The shared live oven state.
//!
//! [`OvenStateStore`] is the single source of truth for what the bridge
//! knows about the oven. It is written by the link task (samples and
//! connection transitions) and by the command gateway (set-point, start and
//! abort bookkeeping), and read by the control surface through
//! [`OvenStateStore::snapshot`].
//!
//! Every operation takes the one internal lock for its whole duration, so a
//! reader sees either all fields of a sample or none of them. Callers never
//! get at the lock itself.
//!
//! # Example
//!
//! ```rust
//! use reflow_bridge::protocol::parse_line;
//! use reflow_bridge::state::OvenStateStore;
//! use reflow_bridge::hal::MockClock;
//!
//! let store = OvenStateStore::with_clock(MockClock::new());
//! let line = "temp=31.5,state=IDLE";
//! let sample = parse_line(line).unwrap();
//! store.apply_sample(&sample, line);
//!
//! let snapshot = store.snapshot();
//! assert_eq!(snapshot.temperature, Some(31.5));
//! assert_eq!(snapshot.sample_sequence, 1);
//! ```

use core::fmt;

use parking_lot::Mutex;

use crate::protocol::{Phase, Telemetry};
use crate::traits::{Clock, SystemClock};

/// Link state machine position as shown to the dashboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum ConnectionStatus {
    /// No device handle.
    #[default]
    Disconnected,
    /// Trying to open the device.
    Connecting,
    /// Device open, reading telemetry.
    Connected,
}

impl ConnectionStatus {
    /// Upper-case name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "DISCONNECTED",
            ConnectionStatus::Connecting => "CONNECTING",
            ConnectionStatus::Connected => "CONNECTED",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mode strings the bridge implies from accepted commands.
pub mod mode {
    /// No cycle requested.
    pub const IDLE: &str = "IDLE";
    /// A START was accepted.
    pub const RUN: &str = "RUN";
    /// An ABORT was accepted.
    pub const ABORT: &str = "ABORT";
}

/// Snapshot of everything the bridge knows about the oven.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct OvenState {
    /// Seconds since the bridge started.
    pub elapsed_seconds: u64,
    /// Last reported temperature in °C.
    pub temperature: Option<f64>,
    /// Target temperature in °C.
    pub setpoint: Option<f64>,
    /// Whether the link holds an open device handle.
    pub connected: bool,
    /// Link state machine position.
    pub connection_status: ConnectionStatus,
    /// Last reported or implied device mode.
    pub command_mode: String,
    /// Device-reported process phase.
    pub phase: Phase,
    /// Last reported heater duty cycle.
    pub pwm_percent: Option<u8>,
    /// Most recent line seen, valid or not.
    pub last_raw_line: String,
    /// Count of successfully applied samples.
    pub sample_sequence: u64,
    /// An operator START was accepted and not yet cleared.
    pub start_requested: bool,
}

impl Default for OvenState {
    fn default() -> Self {
        Self {
            elapsed_seconds: 0,
            temperature: None,
            setpoint: None,
            connected: false,
            connection_status: ConnectionStatus::Disconnected,
            command_mode: mode::IDLE.to_string(),
            phase: Phase::Idle,
            pwm_percent: None,
            last_raw_line: String::new(),
            sample_sequence: 0,
            start_requested: false,
        }
    }
}

/// What changed when a sample was applied.
///
/// Feeds the run-log recorder, which needs the phase from just before the
/// update alongside the values from just after it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampleApplied {
    /// Phase before this sample.
    pub previous_phase: Phase,
    /// Phase after this sample.
    pub phase: Phase,
    /// Temperature carried by this sample.
    pub temperature: f64,
    /// Elapsed seconds stamped on this sample.
    pub elapsed_seconds: u64,
    /// Sequence number assigned to this sample.
    pub sequence: u64,
}

/// Mutex-guarded [`OvenState`].
pub struct OvenStateStore {
    state: Mutex<OvenState>,
    clock: Box<dyn Clock>,
}

impl OvenStateStore {
    /// Create a store timed from now.
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }

    /// Create a store with an explicit time source.
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            state: Mutex::new(OvenState::default()),
            clock: Box::new(clock),
        }
    }

    /// Seconds since the store was created.
    #[inline]
    pub fn elapsed_seconds(&self) -> u64 {
        self.clock.now_ms() / 1000
    }

    /// Run `f` under the lock with elapsed time refreshed first.
    fn update<R>(&self, f: impl FnOnce(&mut OvenState) -> R) -> R {
        let now = self.elapsed_seconds();
        let mut state = self.state.lock();
        state.elapsed_seconds = state.elapsed_seconds.max(now);
        f(&mut state)
    }

    /// Apply one parsed sample.
    ///
    /// Fields absent from the sample keep their previous values. The
    /// sequence number advances last, after every other field is written.
    pub fn apply_sample(&self, sample: &Telemetry, raw_line: &str) -> SampleApplied {
        self.update(|state| {
            let previous_phase = state.phase;

            state.last_raw_line = raw_line.to_string();
            state.temperature = Some(sample.temperature);
            if let Some(setpoint) = sample.setpoint {
                state.setpoint = Some(setpoint);
            }
            if let Some(phase) = sample.phase {
                state.phase = phase;
            }
            if let Some(pwm) = sample.pwm_percent {
                state.pwm_percent = Some(pwm);
            }
            if let Some(mode) = &sample.mode {
                state.command_mode = mode.clone();
            }
            state.sample_sequence += 1;

            SampleApplied {
                previous_phase,
                phase: state.phase,
                temperature: sample.temperature,
                elapsed_seconds: state.elapsed_seconds,
                sequence: state.sample_sequence,
            }
        })
    }

    /// Record a line that did not parse. Only `last_raw_line` and elapsed
    /// time change.
    pub fn apply_raw_only(&self, raw_line: &str) {
        self.update(|state| state.last_raw_line = raw_line.to_string());
    }

    /// Link is trying to open the device.
    pub fn mark_connecting(&self) {
        self.update(|state| {
            state.connected = false;
            state.connection_status = ConnectionStatus::Connecting;
        });
    }

    /// Link opened the device.
    pub fn mark_connected(&self) {
        self.update(|state| {
            state.connected = true;
            state.connection_status = ConnectionStatus::Connected;
        });
    }

    /// Link lost or failed to open the device.
    ///
    /// Clears the heater duty; temperature and set-point stay so the
    /// dashboard keeps showing the last known values.
    pub fn mark_disconnected(&self, reason: &str) {
        self.update(|state| {
            state.connected = false;
            state.connection_status = ConnectionStatus::Disconnected;
            state.pwm_percent = None;
            state.last_raw_line = format!("(error: {})", reason);
        });
    }

    /// Store an operator set-point. The value must already be clamped.
    pub fn set_setpoint(&self, setpoint: f64) {
        self.update(|state| state.setpoint = Some(setpoint));
    }

    /// A START was sent successfully.
    pub fn mark_start_requested(&self) {
        self.update(|state| {
            state.start_requested = true;
            state.command_mode = mode::RUN.to_string();
        });
    }

    /// An ABORT was sent successfully.
    ///
    /// Optimistically moves a running oven to COOLING until the device
    /// reports its own phase. Returns the resulting phase.
    pub fn apply_abort(&self) -> Phase {
        self.update(|state| {
            state.start_requested = false;
            state.pwm_percent = Some(0);
            state.command_mode = mode::ABORT.to_string();
            if !state.phase.is_idle() {
                state.phase = Phase::Cooling;
            }
            state.phase
        })
    }

    /// An IDLE was sent successfully.
    pub fn mark_idle_requested(&self) {
        self.update(|state| {
            state.start_requested = false;
            state.command_mode = mode::IDLE.to_string();
        });
    }

    /// Consistent copy of the whole state with elapsed time refreshed.
    pub fn snapshot(&self) -> OvenState {
        self.update(|state| state.clone())
    }
}

impl Default for OvenStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OvenStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OvenStateStore")
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockClock;
    use crate::protocol::parse_line;
    use std::sync::Arc;

    fn store() -> (OvenStateStore, MockClock) {
        let clock = MockClock::new();
        (OvenStateStore::with_clock(clock.clone()), clock)
    }

    fn apply(store: &OvenStateStore, line: &str) -> SampleApplied {
        store.apply_sample(&parse_line(line).unwrap(), line)
    }

    #[test]
    fn initial_state() {
        let (store, _) = store();
        let state = store.snapshot();
        assert_eq!(state.temperature, None);
        assert_eq!(state.setpoint, None);
        assert!(!state.connected);
        assert_eq!(state.connection_status, ConnectionStatus::Disconnected);
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.command_mode, "IDLE");
        assert_eq!(state.sample_sequence, 0);
        assert!(!state.start_requested);
    }

    #[test]
    fn apply_sample_updates_all_fields() {
        let (store, clock) = store();
        clock.advance_secs(7);

        let applied = apply(&store, "temp=183.4,set=180.0,state=SOAK,pwm=20,mode=RUN");
        assert_eq!(applied.previous_phase, Phase::Idle);
        assert_eq!(applied.phase, Phase::Soak);
        assert_eq!(applied.temperature, 183.4);
        assert_eq!(applied.elapsed_seconds, 7);
        assert_eq!(applied.sequence, 1);

        let state = store.snapshot();
        assert_eq!(state.temperature, Some(183.4));
        assert_eq!(state.setpoint, Some(180.0));
        assert_eq!(state.phase, Phase::Soak);
        assert_eq!(state.pwm_percent, Some(20));
        assert_eq!(state.command_mode, "RUN");
        assert_eq!(state.last_raw_line, "temp=183.4,set=180.0,state=SOAK,pwm=20,mode=RUN");
    }

    #[test]
    fn missing_fields_keep_previous_values() {
        let (store, _) = store();
        apply(&store, "temp=100,set=150,state=PREHEAT,pwm=90");
        apply(&store, "temp=101");

        let state = store.snapshot();
        assert_eq!(state.temperature, Some(101.0));
        assert_eq!(state.setpoint, Some(150.0));
        assert_eq!(state.phase, Phase::Preheat);
        assert_eq!(state.pwm_percent, Some(90));
    }

    #[test]
    fn sequence_counts_samples_only() {
        let (store, _) = store();
        apply(&store, "temp=30");
        store.apply_raw_only("garbage");
        store.apply_raw_only("temp=abc");
        apply(&store, "temp=31");

        let state = store.snapshot();
        assert_eq!(state.sample_sequence, 2);
        assert_eq!(state.last_raw_line, "temp=31");
    }

    #[test]
    fn raw_only_leaves_telemetry_untouched() {
        let (store, clock) = store();
        apply(&store, "temp=30,state=IDLE");
        clock.advance_secs(4);
        store.apply_raw_only("boot v1.2");

        let state = store.snapshot();
        assert_eq!(state.temperature, Some(30.0));
        assert_eq!(state.last_raw_line, "boot v1.2");
        assert_eq!(state.elapsed_seconds, 4);
        assert_eq!(state.sample_sequence, 1);
    }

    #[test]
    fn snapshot_refreshes_elapsed_time() {
        let (store, clock) = store();
        assert_eq!(store.snapshot().elapsed_seconds, 0);
        clock.advance_secs(12);
        assert_eq!(store.snapshot().elapsed_seconds, 12);
    }

    #[test]
    fn connection_transitions() {
        let (store, _) = store();
        store.mark_connecting();
        let state = store.snapshot();
        assert!(!state.connected);
        assert_eq!(state.connection_status, ConnectionStatus::Connecting);

        store.mark_connected();
        let state = store.snapshot();
        assert!(state.connected);
        assert_eq!(state.connection_status, ConnectionStatus::Connected);
    }

    #[test]
    fn disconnect_keeps_last_known_values() {
        let (store, _) = store();
        store.mark_connected();
        apply(&store, "temp=120,set=150,state=SOAK,pwm=40");

        store.mark_disconnected("device unplugged");

        let state = store.snapshot();
        assert!(!state.connected);
        assert_eq!(state.connection_status, ConnectionStatus::Disconnected);
        assert_eq!(state.pwm_percent, None);
        assert_eq!(state.temperature, Some(120.0));
        assert_eq!(state.setpoint, Some(150.0));
        assert_eq!(state.last_raw_line, "(error: device unplugged)");
    }

    #[test]
    fn abort_moves_running_oven_to_cooling() {
        let (store, _) = store();
        apply(&store, "temp=200,state=REFLOW,pwm=100");
        store.mark_start_requested();

        assert_eq!(store.apply_abort(), Phase::Cooling);
        let state = store.snapshot();
        assert_eq!(state.phase, Phase::Cooling);
        assert_eq!(state.pwm_percent, Some(0));
        assert!(!state.start_requested);
        assert_eq!(state.command_mode, "ABORT");
    }

    #[test]
    fn abort_leaves_idle_phase_alone() {
        let (store, _) = store();
        apply(&store, "temp=25,state=IDLE");
        assert_eq!(store.apply_abort(), Phase::Idle);
        assert_eq!(store.snapshot().phase, Phase::Idle);
    }

    #[test]
    fn start_and_idle_requests() {
        let (store, _) = store();
        store.mark_start_requested();
        let state = store.snapshot();
        assert!(state.start_requested);
        assert_eq!(state.command_mode, "RUN");

        store.mark_idle_requested();
        let state = store.snapshot();
        assert!(!state.start_requested);
        assert_eq!(state.command_mode, "IDLE");
    }

    #[test]
    fn concurrent_readers_never_see_torn_samples() {
        let store = Arc::new(OvenStateStore::with_clock(MockClock::new()));

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 1..=500u32 {
                    // temperature and pwm always move together
                    let line = format!("temp={},pwm={}", i, i % 100);
                    store.apply_sample(&parse_line(&line).unwrap(), &line);
                }
            })
        };

        let reader = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                let mut last_seq = 0;
                for _ in 0..500 {
                    let state = store.snapshot();
                    assert!(state.sample_sequence >= last_seq);
                    last_seq = state.sample_sequence;
                    if let Some(temp) = state.temperature {
                        assert_eq!(state.sample_sequence, temp as u64);
                        assert_eq!(state.pwm_percent, Some((temp as u32 % 100) as u8));
                    }
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(store.snapshot().sample_sequence, 500);
    }
}
