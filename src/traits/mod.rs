//! Trait definitions for time and device abstraction.
//!
//! These abstractions let the bridge run against:
//! - a real oven controller on a serial port
//! - a simulated fixture player
//! - scripted mocks in tests
//!
//! # Submodules
//!
//! - `clock`: time source for elapsed-time stamps
//! - `device`: line device, outbound writer and command link

pub mod clock;
pub mod device;

pub use clock::*;
pub use device::*;
