//! Bridge configuration.
//!
//! Builder-style structs with sensible defaults, optionally overlaid from
//! `REFLOW_*` environment variables.
//!
//! # Example
//!
//! ```rust
//! use reflow_bridge::config::{Config, SerialConfig, SimulationConfig, WebConfig};
//!
//! // Use defaults
//! let config = Config::default();
//! assert_eq!(config.serial.port, "/dev/ttyUSB0");
//!
//! // Or customize
//! let config = Config::default()
//!     .with_serial(SerialConfig::default().with_port("/dev/ttyACM0"))
//!     .with_web(WebConfig::default().with_port(8080))
//!     .with_simulation(SimulationConfig::default().with_enabled(true));
//! ```
//!
//! # Environment
//!
//! | Variable | Field |
//! |----------|-------|
//! | `REFLOW_SERIAL_PORT` | `serial.port` |
//! | `REFLOW_BAUD` | `serial.baud` |
//! | `REFLOW_READ_TIMEOUT_MS` | `serial.read_timeout_ms` |
//! | `REFLOW_RETRY_DELAY_MS` | `serial.retry_delay_ms` |
//! | `REFLOW_HTTP_HOST` | `web.host` |
//! | `REFLOW_HTTP_PORT` | `web.port` |
//! | `REFLOW_FAKE` | `simulation.enabled` (1/true/yes/on) |
//! | `REFLOW_FAKE_PERIOD_MS` | `simulation.period_ms` |
//! | `REFLOW_FAKE_FIXTURE` | `simulation.fixture` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

// ============================================================================
// Main Config
// ============================================================================

/// Complete application configuration
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Device connection
    pub serial: SerialConfig,
    /// HTTP control surface
    pub web: WebConfig,
    /// Fake mode
    pub simulation: SimulationConfig,
}

impl Config {
    /// Set serial configuration
    pub fn with_serial(mut self, serial: SerialConfig) -> Self {
        self.serial = serial;
        self
    }

    /// Set web configuration
    pub fn with_web(mut self, web: WebConfig) -> Self {
        self.web = web;
        self
    }

    /// Set simulation configuration
    pub fn with_simulation(mut self, simulation: SimulationConfig) -> Self {
        self.simulation = simulation;
        self
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`, which maps a variable name to its value.
    ///
    /// Unset variables keep the current value. Empty values count as unset.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("REFLOW_SERIAL_PORT") {
            self.serial.port = port.trim().to_string();
        }
        if let Some(v) = get("REFLOW_BAUD") {
            self.serial.baud = parse_number("REFLOW_BAUD", &v)?;
        }
        if let Some(v) = get("REFLOW_READ_TIMEOUT_MS") {
            self.serial.read_timeout_ms = parse_number("REFLOW_READ_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("REFLOW_RETRY_DELAY_MS") {
            self.serial.retry_delay_ms = parse_number("REFLOW_RETRY_DELAY_MS", &v)?;
        }
        if let Some(host) = get("REFLOW_HTTP_HOST") {
            self.web.host = host.trim().to_string();
        }
        if let Some(v) = get("REFLOW_HTTP_PORT") {
            self.web.port = parse_number("REFLOW_HTTP_PORT", &v)?;
        }
        if let Some(v) = get("REFLOW_FAKE") {
            self.simulation.enabled = parse_flag("REFLOW_FAKE", &v)?;
        }
        if let Some(v) = get("REFLOW_FAKE_PERIOD_MS") {
            self.simulation.period_ms = parse_number("REFLOW_FAKE_PERIOD_MS", &v)?;
        }
        if let Some(path) = get("REFLOW_FAKE_FIXTURE") {
            self.simulation.fixture = Some(PathBuf::from(path.trim()));
        }
        Ok(self)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        expected: "a non-negative integer",
    })
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            expected: "one of 1/true/yes/on or 0/false/no/off",
        }),
    }
}

// ============================================================================
// Serial Config
// ============================================================================

/// Device connection configuration
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SerialConfig {
    /// Serial device path
    pub port: String,
    /// Baud rate
    pub baud: u32,
    /// Bound on each blocking read in milliseconds
    pub read_timeout_ms: u64,
    /// Pause between reconnect attempts in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud: 115_200,
            read_timeout_ms: 1000,
            retry_delay_ms: 1000,
        }
    }
}

impl SerialConfig {
    /// Set the device path
    pub fn with_port(mut self, port: &str) -> Self {
        self.port = port.to_string();
        self
    }

    /// Set the baud rate
    pub fn with_baud(mut self, baud: u32) -> Self {
        self.baud = baud;
        self
    }

    /// Set the read timeout
    pub fn with_read_timeout_ms(mut self, ms: u64) -> Self {
        self.read_timeout_ms = ms;
        self
    }

    /// Set the reconnect delay
    pub fn with_retry_delay_ms(mut self, ms: u64) -> Self {
        self.retry_delay_ms = ms;
        self
    }

    /// Read timeout as a [`Duration`]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Reconnect delay as a [`Duration`]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

// ============================================================================
// Web Config
// ============================================================================

/// HTTP control surface configuration
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WebConfig {
    /// Address to bind
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Whether to enable CORS for all origins
    pub cors_permissive: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            cors_permissive: true,
        }
    }
}

impl WebConfig {
    /// Set the bind address
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set CORS mode
    pub fn with_cors(mut self, permissive: bool) -> Self {
        self.cors_permissive = permissive;
        self
    }

    /// `host:port` for binding a listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============================================================================
// Simulation Config
// ============================================================================

/// Fake-mode configuration
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulationConfig {
    /// Replay a fixture instead of opening the serial port
    pub enabled: bool,
    /// Delay between replayed lines in milliseconds
    pub period_ms: u64,
    /// Fixture file; the built-in profile when unset
    pub fixture: Option<PathBuf>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            period_ms: 1000,
            fixture: None,
        }
    }
}

impl SimulationConfig {
    /// Enable or disable fake mode
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the playback period
    pub fn with_period_ms(mut self, ms: u64) -> Self {
        self.period_ms = ms;
        self
    }

    /// Set the fixture file
    pub fn with_fixture(mut self, path: impl Into<PathBuf>) -> Self {
        self.fixture = Some(path.into());
        self
    }

    /// Playback period as a [`Duration`]
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

// ============================================================================
// Tests
// ============================================================================
