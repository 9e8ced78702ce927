//! Device implementations.
//!
//! This module contains concrete implementations of the traits
//! defined in [`crate::traits`].
//!
//! # Available Implementations
//!
//! - `mock`: scripted devices and clocks for tests
//! - `simulated`: fixture playback for running without an oven
//! - `serial`: the real controller on a serial port (requires `serial` feature)

pub mod mock;
pub mod simulated;

#[cfg(feature = "serial")]
pub mod serial;

pub use mock::*;
pub use simulated::*;

#[cfg(feature = "serial")]
pub use serial::*;
