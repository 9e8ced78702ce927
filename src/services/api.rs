//! API request and response types for the HTTP control surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::gateway::{AbortOutcome, CommandRejection, SetpointOutcome};
use crate::protocol::Phase;

/// Error text for an unusable `/api/set` body.
pub const BAD_SET_VALUE: &str = "bad set value";

// ============================================================================
// Response Types
// ============================================================================

/// Result of a start or idle command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Whether the command reached the device
    pub ok: bool,
    /// Why it did not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<CommandRejection>,
}

impl From<Result<(), CommandRejection>> for CommandResponse {
    fn from(result: Result<(), CommandRejection>) -> Self {
        Self {
            ok: result.is_ok(),
            reason: result.err(),
        }
    }
}

/// Result of an abort command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortResponse {
    /// Whether the abort reached the device
    pub ok: bool,
    /// Why it did not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<CommandRejection>,
    /// Phase just before the abort
    pub phase: Phase,
}

impl From<AbortOutcome> for AbortResponse {
    fn from(outcome: AbortOutcome) -> Self {
        Self {
            ok: outcome.result.is_ok(),
            reason: outcome.result.err(),
            phase: outcome.phase_before,
        }
    }
}

/// Result of a set-point command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetResponse {
    /// Whether `SET=` reached the device
    pub ok: bool,
    /// The stored, clamped set-point
    pub set: f64,
    /// Why the send failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<CommandRejection>,
}

impl From<SetpointOutcome> for SetResponse {
    fn from(outcome: SetpointOutcome) -> Self {
        Self {
            ok: outcome.sent.is_ok(),
            set: outcome.setpoint,
            reason: outcome.sent.err(),
        }
    }
}

/// Error body for bad requests and unknown routes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false
    pub ok: bool,
    /// What went wrong
    pub err: String,
}

impl ErrorResponse {
    /// Create an error body
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            err: message.into(),
        }
    }
}

// ============================================================================
// Request Parsing
// ============================================================================

/// Extract the requested set-point from a `/api/set` body.
///
/// Accepts `{"set": 180}` and `{"set": "180.5"}`. Anything else, including
/// non-finite numbers, is `None`.
///
/// ```rust
/// use reflow_bridge::services::parse_set_request;
///
/// assert_eq!(parse_set_request(br#"{"set": 180}"#), Some(180.0));
/// assert_eq!(parse_set_request(br#"{"set": " 99.5 "}"#), Some(99.5));
/// assert_eq!(parse_set_request(br#"{"set": "hot"}"#), None);
/// assert_eq!(parse_set_request(b"not json"), None);
/// ```
pub fn parse_set_request(body: &[u8]) -> Option<f64> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let set = match value.get("set")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    set.is_finite().then_some(set)
}
