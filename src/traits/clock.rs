//! Time source for elapsed-time bookkeeping.

use std::time::Instant;

/// Monotonic time source.
///
/// The state store and run log use this to stamp samples with seconds since
/// bridge start. Tests substitute [`MockClock`](crate::hal::MockClock).
///
/// # Example
///
/// ```rust
/// use reflow_bridge::hal::MockClock;
/// use reflow_bridge::traits::Clock;
///
/// let clock = MockClock::new();
/// assert_eq!(clock.now_ms(), 0);
///
/// clock.advance_secs(3);
/// assert_eq!(clock.now_ms(), 3000);
/// ```
pub trait Clock: Send + Sync {
    /// Milliseconds since an arbitrary epoch. Must never go backwards.
    fn now_ms(&self) -> u64;
}

/// Wall-clock time since construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    /// Start counting from now.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
