//! Validation and forwarding of operator commands.
//!
//! [`CommandGateway`] is the only path from the control surface to the
//! device. It checks each intent against a snapshot of the live state,
//! forwards accepted commands through a [`CommandLink`], and applies the
//! bookkeeping for a successful send back to the store.
//!
//! # Start Preconditions
//!
//! Checked in this order; the first failure wins:
//!
//! 1. [`Disconnected`](CommandRejection::Disconnected) - no open device
//! 2. [`CoolingTooHot`](CommandRejection::CoolingTooHot) - COOLING above 60 °C
//! 3. [`NotIdle`](CommandRejection::NotIdle) - any other non-IDLE phase
//! 4. [`NoTemp`](CommandRejection::NoTemp) - no temperature reported yet
//! 5. [`TooHot`](CommandRejection::TooHot) - IDLE but above 60 °C
//!
//! # Locking
//!
//! The store lock is never held while talking to the device: the gateway
//! snapshots, decides, sends, then re-enters the store to apply the result.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use reflow_bridge::gateway::{CommandGateway, CommandRejection};
//! use reflow_bridge::hal::{MockClock, MockLink};
//! use reflow_bridge::runlog::RunLogRecorder;
//! use reflow_bridge::state::OvenStateStore;
//!
//! let store = Arc::new(OvenStateStore::with_clock(MockClock::new()));
//! let link = Arc::new(MockLink::new());
//! let gateway = CommandGateway::new(store, Arc::new(RunLogRecorder::new()), link.clone());
//!
//! // Nothing is connected yet
//! assert_eq!(gateway.start(), Err(CommandRejection::Disconnected));
//! assert!(link.sent().is_empty());
//!
//! // Set-points are stored even while disconnected
//! let outcome = gateway.set_setpoint(300.0);
//! assert_eq!(outcome.setpoint, 260.0);
//! ```

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::protocol::{DeviceCommand, Phase};
use crate::runlog::RunLogRecorder;
use crate::state::{OvenState, OvenStateStore};
use crate::traits::CommandLink;

/// Lowest set-point the gateway forwards, in °C.
pub const SETPOINT_MIN_C: f64 = 25.0;

/// Highest set-point the gateway forwards, in °C.
pub const SETPOINT_MAX_C: f64 = 260.0;

/// Oven must be at or below this temperature to start a cycle, in °C.
pub const START_MAX_TEMP_C: f64 = 60.0;

/// Clamp an operator set-point into range and round it to 0.1 °C.
///
/// Total: NaN maps to [`SETPOINT_MIN_C`], infinities to the nearest bound.
///
/// ```rust
/// use reflow_bridge::gateway::clamp_setpoint;
///
/// assert_eq!(clamp_setpoint(180.04), 180.0);
/// assert_eq!(clamp_setpoint(-40.0), 25.0);
/// assert_eq!(clamp_setpoint(f64::NAN), 25.0);
/// assert_eq!(clamp_setpoint(f64::INFINITY), 260.0);
/// ```
pub fn clamp_setpoint(value: f64) -> f64 {
    if value.is_nan() {
        return SETPOINT_MIN_C;
    }
    let clamped = value.clamp(SETPOINT_MIN_C, SETPOINT_MAX_C);
    ((clamped * 10.0).round() / 10.0).clamp(SETPOINT_MIN_C, SETPOINT_MAX_C)
}

/// Why a command was refused or failed.
///
/// Serializes as the upper-case reason string the dashboard shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum CommandRejection {
    /// No device is open.
    #[error("DISCONNECTED")]
    Disconnected,
    /// Still cooling and above the start limit.
    #[error("COOLING_TOO_HOT")]
    CoolingTooHot,
    /// A cycle is in progress.
    #[error("NOT_IDLE")]
    NotIdle,
    /// No temperature has been reported yet.
    #[error("NO_TEMP")]
    NoTemp,
    /// Idle but above the start limit.
    #[error("TOO_HOT")]
    TooHot,
    /// The command could not be written to the device.
    #[error("SERIAL_WRITE_FAIL")]
    SerialWriteFail,
}

impl CommandRejection {
    /// Reason string, identical to the `Display` output.
    pub const fn as_str(&self) -> &'static str {
        match self {
            CommandRejection::Disconnected => "DISCONNECTED",
            CommandRejection::CoolingTooHot => "COOLING_TOO_HOT",
            CommandRejection::NotIdle => "NOT_IDLE",
            CommandRejection::NoTemp => "NO_TEMP",
            CommandRejection::TooHot => "TOO_HOT",
            CommandRejection::SerialWriteFail => "SERIAL_WRITE_FAIL",
        }
    }
}

/// Decide whether a START may be sent in `state`.
///
/// Pure; the gateway calls it on a snapshot.
pub fn check_start(state: &OvenState) -> Result<(), CommandRejection> {
    if !state.connected {
        return Err(CommandRejection::Disconnected);
    }
    match state.phase {
        Phase::Cooling => {
            if state.temperature.is_some_and(|t| t > START_MAX_TEMP_C) {
                return Err(CommandRejection::CoolingTooHot);
            }
            return Err(CommandRejection::NotIdle);
        }
        Phase::Idle => {}
        _ => return Err(CommandRejection::NotIdle),
    }
    match state.temperature {
        None => Err(CommandRejection::NoTemp),
        Some(t) if t > START_MAX_TEMP_C => Err(CommandRejection::TooHot),
        Some(_) => Ok(()),
    }
}

/// Result of an abort request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AbortOutcome {
    /// Whether the abort was sent.
    pub result: Result<(), CommandRejection>,
    /// Phase observed just before the abort.
    pub phase_before: Phase,
}

/// Result of a set-point request.
///
/// The set-point is stored before it is sent and is not rolled back when the
/// send fails.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SetpointOutcome {
    /// The clamped value now in the store.
    pub setpoint: f64,
    /// Whether `SET=` reached the device.
    pub sent: Result<(), CommandRejection>,
}

/// Validates operator intents and forwards them to the device.
pub struct CommandGateway {
    store: Arc<OvenStateStore>,
    recorder: Arc<RunLogRecorder>,
    link: Arc<dyn CommandLink>,
}

impl CommandGateway {
    /// Gateway over a store, a run-log recorder and a command link.
    pub fn new(
        store: Arc<OvenStateStore>,
        recorder: Arc<RunLogRecorder>,
        link: Arc<dyn CommandLink>,
    ) -> Self {
        Self {
            store,
            recorder,
            link,
        }
    }

    /// Start a reflow cycle.
    ///
    /// On success the store records the request and a fresh run-log capture
    /// begins immediately.
    pub fn start(&self) -> Result<(), CommandRejection> {
        let state = self.store.snapshot();
        if let Err(reason) = check_start(&state) {
            debug!(%reason, phase = %state.phase, temperature = ?state.temperature, "START rejected");
            return Err(reason);
        }

        self.send(DeviceCommand::Start)?;
        self.store.mark_start_requested();
        self.recorder.force_start(self.store.elapsed_seconds());
        info!("Reflow cycle started");
        Ok(())
    }

    /// Abort the running cycle.
    pub fn abort(&self) -> AbortOutcome {
        let state = self.store.snapshot();
        let phase_before = state.phase;
        if !state.connected {
            debug!(reason = %CommandRejection::Disconnected, "ABORT rejected");
            return AbortOutcome {
                result: Err(CommandRejection::Disconnected),
                phase_before,
            };
        }

        let result = self.send(DeviceCommand::Abort).map(|()| {
            let phase = self.store.apply_abort();
            info!(from = %phase_before, to = %phase, "Reflow cycle aborted");
        });
        AbortOutcome {
            result,
            phase_before,
        }
    }

    /// Return the controller to idle. Sent regardless of state.
    pub fn idle(&self) -> Result<(), CommandRejection> {
        self.send(DeviceCommand::Idle)?;
        self.store.mark_idle_requested();
        Ok(())
    }

    /// Store and send a new set-point.
    pub fn set_setpoint(&self, value: f64) -> SetpointOutcome {
        let setpoint = clamp_setpoint(value);
        self.store.set_setpoint(setpoint);
        let sent = self.send(DeviceCommand::SetPoint(setpoint));
        SetpointOutcome { setpoint, sent }
    }

    fn send(&self, command: DeviceCommand) -> Result<(), CommandRejection> {
        self.link.send(&command).map_err(|error| {
            debug!(%command, %error, "Command not delivered");
            CommandRejection::SerialWriteFail
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{MockClock, MockLink};
    use crate::protocol::parse_line;

    struct Fixture {
        store: Arc<OvenStateStore>,
        recorder: Arc<RunLogRecorder>,
        link: Arc<MockLink>,
        gateway: CommandGateway,
        clock: MockClock,
    }

    fn fixture() -> Fixture {
        let clock = MockClock::new();
        let store = Arc::new(OvenStateStore::with_clock(clock.clone()));
        let recorder = Arc::new(RunLogRecorder::new());
        let link = Arc::new(MockLink::new());
        let gateway = CommandGateway::new(store.clone(), recorder.clone(), link.clone());
        Fixture {
            store,
            recorder,
            link,
            gateway,
            clock,
        }
    }

    impl Fixture {
        fn connected_with(&self, line: &str) {
            self.store.mark_connected();
            self.store.apply_sample(&parse_line(line).unwrap(), line);
        }
    }

    #[test]
    fn clamp_rounds_to_one_decimal() {
        assert_eq!(clamp_setpoint(180.26), 180.3);
        assert_eq!(clamp_setpoint(25.0), 25.0);
        assert_eq!(clamp_setpoint(260.0), 260.0);
        assert_eq!(clamp_setpoint(1000.0), 260.0);
        assert_eq!(clamp_setpoint(f64::NEG_INFINITY), 25.0);
    }

    #[test]
    fn clamp_is_idempotent() {
        for v in [-10.0, 24.96, 99.99, 180.45, 259.97, 300.0] {
            let once = clamp_setpoint(v);
            assert_eq!(clamp_setpoint(once), once);
            assert!((SETPOINT_MIN_C..=SETPOINT_MAX_C).contains(&once));
        }
    }

    #[test]
    fn rejection_strings() {
        assert_eq!(CommandRejection::CoolingTooHot.to_string(), "COOLING_TOO_HOT");
        assert_eq!(CommandRejection::SerialWriteFail.as_str(), "SERIAL_WRITE_FAIL");
    }

    #[test]
    fn start_requires_connection() {
        let f = fixture();
        f.store.apply_sample(&parse_line("temp=25,state=IDLE").unwrap(), "temp=25,state=IDLE");
        assert_eq!(f.gateway.start(), Err(CommandRejection::Disconnected));
        assert!(f.link.sent().is_empty());
    }

    #[test]
    fn start_while_cooling_hot() {
        let f = fixture();
        f.connected_with("temp=75.0,state=COOLING");
        assert_eq!(f.gateway.start(), Err(CommandRejection::CoolingTooHot));
        assert!(f.link.sent().is_empty());
        assert!(!f.store.snapshot().start_requested);
    }

    #[test]
    fn start_while_cooling_cold_is_not_idle() {
        let f = fixture();
        f.connected_with("temp=55.0,state=COOLING");
        assert_eq!(f.gateway.start(), Err(CommandRejection::NotIdle));
    }

    #[test]
    fn start_mid_cycle_is_not_idle() {
        let f = fixture();
        f.connected_with("temp=150,state=SOAK");
        assert_eq!(f.gateway.start(), Err(CommandRejection::NotIdle));
    }

    #[test]
    fn start_without_temperature() {
        let f = fixture();
        f.store.mark_connected();
        assert_eq!(f.gateway.start(), Err(CommandRejection::NoTemp));
    }

    #[test]
    fn start_when_idle_but_hot() {
        let f = fixture();
        f.connected_with("temp=61,state=IDLE");
        assert_eq!(f.gateway.start(), Err(CommandRejection::TooHot));
    }

    #[test]
    fn start_at_limit_is_allowed() {
        let f = fixture();
        f.connected_with("temp=60.0,state=IDLE");
        assert_eq!(f.gateway.start(), Ok(()));
    }

    #[test]
    fn start_success_records_request_and_starts_log() {
        let f = fixture();
        f.connected_with("temp=28,state=IDLE");
        f.clock.advance_secs(42);

        assert_eq!(f.gateway.start(), Ok(()));
        assert_eq!(f.link.sent(), vec![DeviceCommand::Start]);

        let state = f.store.snapshot();
        assert!(state.start_requested);
        assert_eq!(state.command_mode, "RUN");
        assert!(f.recorder.is_active());
        assert_eq!(f.recorder.start_time(), Some(42));
        assert!(f.recorder.is_empty());
    }

    #[test]
    fn start_write_failure_changes_nothing() {
        let f = fixture();
        f.connected_with("temp=28,state=IDLE");
        f.link.set_fail(true);

        assert_eq!(f.gateway.start(), Err(CommandRejection::SerialWriteFail));
        let state = f.store.snapshot();
        assert!(!state.start_requested);
        assert_eq!(state.command_mode, "IDLE");
        assert!(!f.recorder.is_active());
    }

    #[test]
    fn abort_disconnected() {
        let f = fixture();
        let outcome = f.gateway.abort();
        assert_eq!(outcome.result, Err(CommandRejection::Disconnected));
        assert_eq!(outcome.phase_before, Phase::Idle);
        assert!(f.link.sent().is_empty());
    }

    #[test]
    fn abort_running_cycle() {
        let f = fixture();
        f.connected_with("temp=200,state=REFLOW,pwm=100");
        f.store.mark_start_requested();

        let outcome = f.gateway.abort();
        assert_eq!(outcome.result, Ok(()));
        assert_eq!(outcome.phase_before, Phase::Reflow);
        assert_eq!(f.link.sent(), vec![DeviceCommand::Abort]);

        let state = f.store.snapshot();
        assert_eq!(state.phase, Phase::Cooling);
        assert_eq!(state.pwm_percent, Some(0));
        assert!(!state.start_requested);
        assert_eq!(state.command_mode, "ABORT");
    }

    #[test]
    fn abort_write_failure_leaves_state() {
        let f = fixture();
        f.connected_with("temp=200,state=REFLOW,pwm=100");
        f.link.set_fail(true);

        let outcome = f.gateway.abort();
        assert_eq!(outcome.result, Err(CommandRejection::SerialWriteFail));
        let state = f.store.snapshot();
        assert_eq!(state.phase, Phase::Reflow);
        assert_eq!(state.pwm_percent, Some(100));
    }

    #[test]
    fn idle_is_unconditional() {
        let f = fixture();
        f.store.mark_start_requested();
        assert_eq!(f.gateway.idle(), Ok(()));
        assert_eq!(f.link.sent(), vec![DeviceCommand::Idle]);
        assert!(!f.store.snapshot().start_requested);
    }

    #[test]
    fn idle_failure_keeps_start_requested() {
        let f = fixture();
        f.store.mark_start_requested();
        f.link.set_fail(true);
        assert_eq!(f.gateway.idle(), Err(CommandRejection::SerialWriteFail));
        assert!(f.store.snapshot().start_requested);
    }

    #[test]
    fn setpoint_stored_even_when_send_fails() {
        let f = fixture();
        f.link.set_fail(true);

        let outcome = f.gateway.set_setpoint(180.04);
        assert_eq!(outcome.setpoint, 180.0);
        assert_eq!(outcome.sent, Err(CommandRejection::SerialWriteFail));
        assert_eq!(f.store.snapshot().setpoint, Some(180.0));
    }

    #[test]
    fn setpoint_sent_clamped() {
        let f = fixture();
        let outcome = f.gateway.set_setpoint(-5.0);
        assert_eq!(outcome.setpoint, 25.0);
        assert_eq!(outcome.sent, Ok(()));
        assert_eq!(f.link.sent(), vec![DeviceCommand::SetPoint(25.0)]);
    }

    #[test]
    fn repeated_commands_are_not_deduplicated() {
        let f = fixture();
        f.gateway.idle().unwrap();
        f.gateway.idle().unwrap();
        assert_eq!(f.link.sent().len(), 2);
    }
}
