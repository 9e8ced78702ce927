//! Device line protocol: telemetry parsing and command encoding.
//!
//! The oven firmware prints one telemetry sample per line as comma-separated
//! `key=value` tokens:
//!
//! ```text
//! temp=183.4,set=180.0,state=SOAK,pwm=20
//! ```
//!
//! The bridge answers with single `KEY=VALUE` command lines such as
//! `CMD=START` or `SET=180.0`.
//!
//! # Example
//!
//! ```rust
//! use reflow_bridge::protocol::{parse_line, DeviceCommand, Phase};
//!
//! let sample = parse_line("temp=183.4,set=180.0,state=SOAK,pwm=20").unwrap();
//! assert_eq!(sample.temperature, 183.4);
//! assert_eq!(sample.phase, Some(Phase::Soak));
//!
//! // Lines without a usable temperature are not samples
//! assert!(parse_line("temp=abc,state=SOAK").is_none());
//!
//! assert_eq!(DeviceCommand::SetPoint(180.0).encode(), b"SET=180.0\n");
//! ```

use core::fmt;

/// Process phase reported by the oven firmware.
///
/// Parsed case-insensitively from the `state=` token and always presented
/// upper-case.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum Phase {
    /// Heater off, waiting for a start.
    #[default]
    Idle,
    /// Ramping up to the soak temperature.
    Preheat,
    /// Holding to equalize board temperature.
    Soak,
    /// Ramping up to peak.
    Ramp,
    /// At or around peak temperature.
    Reflow,
    /// Heater off, oven cooling down.
    Cooling,
}

impl Phase {
    /// All phases in process order.
    pub const ALL: [Phase; 6] = [
        Phase::Idle,
        Phase::Preheat,
        Phase::Soak,
        Phase::Ramp,
        Phase::Reflow,
        Phase::Cooling,
    ];

    /// Returns the upper-case wire name.
    ///
    /// ```
    /// use reflow_bridge::Phase;
    ///
    /// assert_eq!(Phase::Preheat.as_str(), "PREHEAT");
    /// ```
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "IDLE",
            Phase::Preheat => "PREHEAT",
            Phase::Soak => "SOAK",
            Phase::Ramp => "RAMP",
            Phase::Reflow => "REFLOW",
            Phase::Cooling => "COOLING",
        }
    }

    /// Parse a phase name. Input is trimmed and case-insensitive.
    ///
    /// ```
    /// use reflow_bridge::Phase;
    ///
    /// assert_eq!(Phase::from_text("soak"), Some(Phase::Soak));
    /// assert_eq!(Phase::from_text(" Cooling "), Some(Phase::Cooling));
    /// assert_eq!(Phase::from_text("AMBIENT"), None);
    /// ```
    pub fn from_text(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|phase| phase.as_str().eq_ignore_ascii_case(s))
    }

    /// True only for [`Phase::Idle`].
    #[inline]
    pub const fn is_idle(&self) -> bool {
        matches!(self, Phase::Idle)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Inbound telemetry
// ============================================================================

/// One telemetry sample parsed from a device line.
///
/// Only `temperature` is mandatory. Every optional field is `None` when the
/// token was missing or its value could not be parsed.
#[derive(Clone, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Telemetry {
    /// Oven temperature in °C (`temp=`).
    pub temperature: f64,
    /// Controller set-point in °C (`set=`).
    pub setpoint: Option<f64>,
    /// Process phase (`state=`).
    pub phase: Option<Phase>,
    /// Heater duty cycle, 0..=100 (`pwm=`).
    pub pwm_percent: Option<u8>,
    /// Firmware mode passthrough (`mode=`).
    pub mode: Option<String>,
}

/// Parse a telemetry line.
///
/// Returns `None` when the line is empty or has no parseable `temp` token.
/// Tokens without `=` and unknown keys are ignored. An unparseable `set`,
/// `pwm` or unknown `state` value drops just that field. When a key appears
/// twice the last valid value wins.
pub fn parse_line(line: &str) -> Option<Telemetry> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let mut temperature = None;
    let mut sample = Telemetry::default();

    for token in line.split(',') {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        let value = value.trim();

        match key.trim() {
            // A bad temperature invalidates the whole line
            "temp" => temperature = Some(parse_number(value)?),
            "set" => {
                if let Some(set) = parse_number(value) {
                    sample.setpoint = Some(set);
                }
            }
            "state" => {
                if let Some(phase) = Phase::from_text(value) {
                    sample.phase = Some(phase);
                }
            }
            "pwm" => {
                if let Some(pwm) = parse_number(value) {
                    sample.pwm_percent = Some(pwm.trunc().clamp(0.0, 100.0) as u8);
                }
            }
            "mode" => sample.mode = Some(value.to_string()),
            _ => {}
        }
    }

    sample.temperature = temperature?;
    Some(sample)
}

/// Parse a finite decimal number. `inf` and `NaN` count as unparseable.
fn parse_number(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Decode raw bytes from the wire as ASCII, dropping anything else, and trim.
pub fn decode_line(raw: &[u8]) -> String {
    let text: String = raw
        .iter()
        .copied()
        .filter(u8::is_ascii)
        .map(char::from)
        .collect();
    text.trim().to_string()
}

// ============================================================================
// Outbound commands
// ============================================================================

/// A command line the bridge can send to the device.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DeviceCommand {
    /// `CMD=START`: begin a reflow cycle.
    Start,
    /// `CMD=ABORT`: stop heating immediately.
    Abort,
    /// `CMD=IDLE`: force the controller back to idle.
    Idle,
    /// `SET=<value>`: new set-point, sent with one decimal.
    SetPoint(f64),
}

impl DeviceCommand {
    /// The key half of the command line.
    pub const fn key(&self) -> &'static str {
        match self {
            DeviceCommand::SetPoint(_) => "SET",
            _ => "CMD",
        }
    }

    /// The value half of the command line.
    pub fn value(&self) -> String {
        match self {
            DeviceCommand::Start => "START".to_string(),
            DeviceCommand::Abort => "ABORT".to_string(),
            DeviceCommand::Idle => "IDLE".to_string(),
            DeviceCommand::SetPoint(value) => format!("{:.1}", value),
        }
    }

    /// Bytes to put on the wire, newline terminated.
    pub fn encode(&self) -> Vec<u8> {
        encode_command(self.key(), &self.value())
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key(), self.value())
    }
}

/// Serialize `KEY=VALUE` as one ASCII line terminated by `\n`.
///
/// Non-ASCII characters are dropped rather than rejected.
pub fn encode_command(key: &str, value: &str) -> Vec<u8> {
    let line = format!("{}={}", key.trim(), value.trim());
    let mut bytes: Vec<u8> = line
        .chars()
        .filter(char::is_ascii)
        .map(|c| c as u8)
        .filter(|b| *b != b'\n' && *b != b'\r')
        .collect();
    bytes.push(b'\n');
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // parse_line
    // =========================================================================

    #[test]
    fn parse_full_sample() {
        let sample = parse_line("temp=183.4,set=180.0,state=SOAK,pwm=20").unwrap();
        assert_eq!(sample.temperature, 183.4);
        assert_eq!(sample.setpoint, Some(180.0));
        assert_eq!(sample.phase, Some(Phase::Soak));
        assert_eq!(sample.pwm_percent, Some(20));
        assert_eq!(sample.mode, None);
    }

    #[test]
    fn parse_temp_only() {
        let sample = parse_line("temp=25").unwrap();
        assert_eq!(sample.temperature, 25.0);
        assert_eq!(sample.setpoint, None);
        assert_eq!(sample.phase, None);
        assert_eq!(sample.pwm_percent, None);
    }

    #[test]
    fn parse_bad_temp_rejects_line() {
        assert!(parse_line("temp=abc,state=SOAK").is_none());
    }

    #[test]
    fn parse_missing_temp_rejects_line() {
        assert!(parse_line("set=180.0,state=SOAK,pwm=20").is_none());
    }

    #[test]
    fn parse_empty_and_blank() {
        assert!(parse_line("").is_none());
        assert!(parse_line("   \t ").is_none());
    }

    #[test]
    fn parse_trims_whitespace() {
        let sample = parse_line("  temp = 99.5 , state = reflow ,pwm= 80 ").unwrap();
        assert_eq!(sample.temperature, 99.5);
        assert_eq!(sample.phase, Some(Phase::Reflow));
        assert_eq!(sample.pwm_percent, Some(80));
    }

    #[test]
    fn parse_lowercase_state_is_normalized() {
        let sample = parse_line("temp=30,state=preheat").unwrap();
        assert_eq!(sample.phase, Some(Phase::Preheat));
    }

    #[test]
    fn parse_unknown_state_is_dropped() {
        let sample = parse_line("temp=30,state=AMBIENT").unwrap();
        assert_eq!(sample.phase, None);
    }

    #[test]
    fn parse_bad_set_is_ignored() {
        let sample = parse_line("temp=30,set=hot").unwrap();
        assert_eq!(sample.temperature, 30.0);
        assert_eq!(sample.setpoint, None);
    }

    #[test]
    fn parse_pwm_truncates_float() {
        let sample = parse_line("temp=30,pwm=42.9").unwrap();
        assert_eq!(sample.pwm_percent, Some(42));
    }

    #[test]
    fn parse_pwm_out_of_range_is_clamped() {
        assert_eq!(parse_line("temp=30,pwm=150").unwrap().pwm_percent, Some(100));
        assert_eq!(parse_line("temp=30,pwm=-5").unwrap().pwm_percent, Some(0));
    }

    #[test]
    fn parse_bad_pwm_is_ignored() {
        assert_eq!(parse_line("temp=30,pwm=full").unwrap().pwm_percent, None);
    }

    #[test]
    fn parse_mode_passthrough() {
        let sample = parse_line("temp=30,mode=RUN").unwrap();
        assert_eq!(sample.mode.as_deref(), Some("RUN"));
    }

    #[test]
    fn parse_ignores_junk_tokens() {
        let sample = parse_line("boot ok,temp=30,foo=bar,,=").unwrap();
        assert_eq!(sample.temperature, 30.0);
    }

    #[test]
    fn parse_value_may_contain_equals() {
        let sample = parse_line("temp=30,mode=A=B").unwrap();
        assert_eq!(sample.mode.as_deref(), Some("A=B"));
    }

    #[test]
    fn parse_non_finite_temp_rejects_line() {
        assert!(parse_line("temp=NaN").is_none());
        assert!(parse_line("temp=inf").is_none());
    }

    #[test]
    fn parse_negative_temp() {
        assert_eq!(parse_line("temp=-12.5").unwrap().temperature, -12.5);
    }

    // =========================================================================
    // Phase
    // =========================================================================

    #[test]
    fn phase_round_trips_through_text() {
        for phase in Phase::ALL {
            assert_eq!(Phase::from_text(phase.as_str()), Some(phase));
        }
    }

    #[test]
    fn phase_default_is_idle() {
        assert_eq!(Phase::default(), Phase::Idle);
        assert!(Phase::default().is_idle());
        assert!(!Phase::Cooling.is_idle());
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    #[test]
    fn encode_commands() {
        assert_eq!(DeviceCommand::Start.encode(), b"CMD=START\n");
        assert_eq!(DeviceCommand::Abort.encode(), b"CMD=ABORT\n");
        assert_eq!(DeviceCommand::Idle.encode(), b"CMD=IDLE\n");
        assert_eq!(DeviceCommand::SetPoint(217.0).encode(), b"SET=217.0\n");
        assert_eq!(DeviceCommand::SetPoint(180.26).encode(), b"SET=180.3\n");
    }

    #[test]
    fn command_display_has_no_newline() {
        assert_eq!(DeviceCommand::Start.to_string(), "CMD=START");
        assert_eq!(DeviceCommand::SetPoint(25.0).to_string(), "SET=25.0");
    }

    #[test]
    fn encode_drops_non_ascii() {
        assert_eq!(encode_command("SET", "180°"), b"SET=180\n");
        assert_eq!(encode_command(" CMD ", " START\n"), b"CMD=START\n");
    }

    #[test]
    fn decode_drops_non_ascii_and_trims() {
        assert_eq!(decode_line(b"temp=30\xff,state=IDLE\r\n"), "temp=30,state=IDLE");
        assert_eq!(decode_line(b"\r\n"), "");
    }
}
