//! # reflow-bridge
//!
//! A bridge between a microcontroller-driven reflow oven and an HTTP control
//! surface. The oven firmware streams telemetry lines over a serial link; the
//! bridge keeps the live oven state, guards operator commands and records a
//! log of each heating cycle for CSV export.
//!
//! ## Features
//!
//! - **Line protocol**: parsing of `temp=...,state=...` telemetry, encoding of `CMD=`/`SET=` commands
//! - **Resilient link**: connect, read, reconnect with a fixed backoff, forever
//! - **Consistent state**: one lock, atomic updates, snapshot reads
//! - **Automatic run log**: capture starts at IDLE → PREHEAT and stops once cool
//! - **Safety checks**: START refused while hot, mid-cycle or disconnected; set-points clamped
//!
//! ## Architecture
//!
//! The crate is structured to allow testing without an oven attached:
//!
//! - `protocol` - Telemetry parsing and command encoding
//! - `traits` - Clock and device abstractions
//! - `hal` - Concrete devices (serial port, simulated fixture, mocks)
//! - `state` - The shared oven state store
//! - `runlog` - Cycle capture and CSV export
//! - `link` - Connection state machine and outbound writer
//! - `gateway` - Command validation
//! - `bridge` - Wiring of all of the above
//! - `services` - HTTP control surface (`web` feature)
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use reflow_bridge::{CommandGateway, CommandRejection, OvenStateStore, RunLogRecorder};
//! use reflow_bridge::bridge::TelemetryIngest;
//! use reflow_bridge::hal::{MockClock, MockLink};
//!
//! let store = Arc::new(OvenStateStore::with_clock(MockClock::new()));
//! let recorder = Arc::new(RunLogRecorder::new());
//! let link = Arc::new(MockLink::new());
//! let gateway = CommandGateway::new(store.clone(), recorder.clone(), link.clone());
//! let ingest = TelemetryIngest::new(store.clone(), recorder.clone());
//!
//! // Telemetry arrives from the oven
//! store.mark_connected();
//! ingest.ingest("temp=75.0,set=25.0,state=COOLING,pwm=0");
//!
//! // Too hot to start another cycle
//! assert_eq!(gateway.start(), Err(CommandRejection::CoolingTooHot));
//! assert!(link.sent().is_empty());
//! ```

#![warn(missing_docs)]

/// Shared live oven state behind one lock.
pub mod state;
/// Device line protocol: telemetry parsing and command encoding.
pub mod protocol;
/// Error types for the link, configuration and export.
pub mod error;
/// Hardware abstraction layer: serial, simulated and mock devices.
pub mod hal;
/// Core traits for time and device abstraction.
pub mod traits;
/// Cycle capture and CSV export.
pub mod runlog;
/// Connection state machine and outbound writer.
pub mod link;
/// Operator command validation.
pub mod gateway;
/// Wiring of store, recorder, link and gateway.
pub mod bridge;

/// Bridge configuration with environment overlay.
pub mod config;

/// HTTP control surface (feature-gated).
#[cfg(feature = "web")]
pub mod services;

// Re-exports for convenience
pub use bridge::{OvenBridge, TelemetryIngest};
pub use error::{ConfigError, ExportError, LinkError};
pub use gateway::{
    clamp_setpoint, AbortOutcome, CommandGateway, CommandRejection, SetpointOutcome,
};
pub use link::{LinkState, SerialLink};
pub use protocol::{encode_command, parse_line, DeviceCommand, Phase, Telemetry};
pub use runlog::{RunLogEntry, RunLogRecorder};
pub use state::{ConnectionStatus, OvenState, OvenStateStore, SampleApplied};
pub use traits::{Clock, CommandLink, LineDevice, LineWriter, SystemClock};

// Config re-exports
pub use config::{Config, SerialConfig, SimulationConfig, WebConfig};
