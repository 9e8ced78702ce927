//! Error types for the device link, configuration and run-log export.

use thiserror::Error;

/// Failure talking to the oven device.
///
/// Every variant is transient from the bridge's point of view: the link loop
/// tears the connection down and retries.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The device could not be opened.
    #[error("cannot open {path}: {reason}")]
    Open {
        /// Device path or fixture name.
        path: String,
        /// Driver error text.
        reason: String,
    },

    /// Read or write failed on an open device.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// No device handle is currently open.
    #[error("device not connected")]
    NotConnected,

    /// The device went away (end of stream, dropped handle, blocking task died).
    #[error("device closed: {0}")]
    Closed(String),
}

/// Invalid configuration value.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value of the wrong shape.
    #[error("invalid value {value:?} for {key}: expected {expected}")]
    Invalid {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
        /// What was expected instead.
        expected: &'static str,
    },
}

/// Failure rendering the run-log CSV export.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV encoding failed.
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    /// Flushing the CSV writer failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Output was not valid UTF-8.
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
}
