//! Timestamps and clock sources
//!
//! Containers never read a clock themselves: the caller samples one clock
//! per packet batch and passes the value down, so every structure sees the
//! same monotonically non-decreasing `now`.

use std::cell::Cell;
use std::time::Instant;

/// Nanosecond timestamp
pub type Time = i64;

/// Nanoseconds per second
pub const NANOS_PER_SEC: Time = 1_000_000_000;

/// Source of monotonic timestamps
pub trait Clock {
    /// Current time in nanoseconds. Never decreases between calls.
    fn now(&self) -> Time;
}

/// Monotonic clock anchored at its creation instant
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock reading zero now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline(always)]
    fn now(&self) -> Time {
        // i64 nanoseconds covers ~292 years of uptime
        self.origin.elapsed().as_nanos() as Time
    }
}

/// Hand-driven clock for tests and trace replay
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Time>,
}

impl ManualClock {
    /// Create a clock reading `start`
    pub fn new(start: Time) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    /// Move the clock forward by `delta` nanoseconds
    pub fn advance(&self, delta: Time) {
        debug_assert!(delta >= 0, "clock must not go backwards");
        self.now.set(self.now.get() + delta);
    }

    /// Jump to an absolute time (must not be earlier than the current one)
    pub fn set(&self, now: Time) {
        debug_assert!(now >= self.now.get(), "clock must not go backwards");
        self.now.set(now);
    }
}

impl Clock for ManualClock {
    #[inline(always)]
    fn now(&self) -> Time {
        self.now.get()
    }
}
