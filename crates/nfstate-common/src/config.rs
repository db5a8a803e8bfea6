//! Container configuration
//!
//! Plain data handed to constructors. One value per worker: workers never
//! share a table, so a global capacity is split with [`per_worker_capacity`]
//! before each worker builds its own instances.

use serde::Deserialize;

use crate::error::ConfigError;
use crate::time::{Time, NANOS_PER_SEC};

/// Largest capacity any single structure accepts
pub const MAX_CAPACITY: usize = 1 << 20;

/// Default per-table capacity
pub const DEFAULT_CAPACITY: usize = 65536;

/// Default idle time before an entry expires (10 seconds)
pub const DEFAULT_EXPIRATION_TIME: Time = 10 * NANOS_PER_SEC;

/// Default sketch hit threshold
pub const DEFAULT_SKETCH_THRESHOLD: u16 = 64;

/// One logical flow table (map + arenas + index ring)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Number of entries the table can hold
    pub capacity: usize,
    /// Idle time in nanoseconds after which an entry is expired
    pub expiration_time: Time,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            expiration_time: DEFAULT_EXPIRATION_TIME,
        }
    }
}

impl TableConfig {
    /// Check ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_capacity(self.capacity)?;
        check_expiration(self.expiration_time)
    }
}

/// Heavy-hitter sketch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SketchConfig {
    /// Distinct digests tracked per hash function
    pub capacity: usize,
    /// A key is a heavy hitter once its estimate exceeds this
    pub threshold: u16,
    /// Idle time in nanoseconds after which a digest is forgotten
    pub expiration_time: Time,
}

impl Default for SketchConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            threshold: DEFAULT_SKETCH_THRESHOLD,
            expiration_time: DEFAULT_EXPIRATION_TIME,
        }
    }
}

impl SketchConfig {
    /// Check ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_capacity(self.capacity)?;
        check_expiration(self.expiration_time)
    }
}

fn check_capacity(capacity: usize) -> Result<(), ConfigError> {
    if capacity == 0 || capacity > MAX_CAPACITY {
        return Err(ConfigError::CapacityOutOfRange(capacity));
    }
    Ok(())
}

fn check_expiration(expiration_time: Time) -> Result<(), ConfigError> {
    if expiration_time < 0 {
        return Err(ConfigError::NegativeExpiration(expiration_time));
    }
    Ok(())
}

/// Smallest power of two `>= n` (1 for `n == 0`)
#[inline]
pub fn next_power_of_two(n: usize) -> usize {
    n.max(1).next_power_of_two()
}

/// Share of `total` capacity owned by one of `workers` shared-nothing
/// workers, rounded up to a power of two.
pub fn per_worker_capacity(total: usize, workers: usize) -> Result<usize, ConfigError> {
    if workers == 0 {
        return Err(ConfigError::NoWorkers);
    }
    let share = next_power_of_two(total / workers);
    check_capacity(share)?;
    Ok(share)
}
