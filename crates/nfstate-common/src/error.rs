//! Error types shared by every nfstate container

use thiserror::Error;

/// Construction-time failure of a fixed-capacity structure.
///
/// Returned instead of a half-built value: when any backing array cannot be
/// reserved, everything reserved so far is dropped before this is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    /// Backing storage could not be obtained
    #[error("{structure}: cannot reserve backing storage for {requested} elements")]
    OutOfMemory {
        /// Structure being built
        structure: &'static str,
        /// Element count that was requested
        requested: usize,
    },

    /// Capacity is zero, too large, or otherwise unusable
    #[error("{structure}: invalid capacity {capacity}: {reason}")]
    InvalidCapacity {
        /// Structure being built
        structure: &'static str,
        /// Rejected capacity
        capacity: usize,
        /// Why it was rejected
        reason: &'static str,
    },
}

impl AllocError {
    /// Map a failed `try_reserve_exact` to [`AllocError::OutOfMemory`]
    pub fn out_of_memory(structure: &'static str, requested: usize) -> Self {
        Self::OutOfMemory {
            structure,
            requested,
        }
    }
}

/// Invalid configuration value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Capacity outside `1..=MAX_CAPACITY`
    #[error("capacity {0} out of range (1..={max})", max = crate::config::MAX_CAPACITY)]
    CapacityOutOfRange(usize),

    /// Negative expiration time
    #[error("expiration time must not be negative, got {0}ns")]
    NegativeExpiration(i64),

    /// Worker count of zero
    #[error("worker count must be at least 1")]
    NoWorkers,
}

/// Result alias for construction
pub type AllocResult<T> = Result<T, AllocError>;

/// Reserve exactly `len` slots in a fresh vector, or report which structure
/// could not be built.
pub fn try_vec<T>(structure: &'static str, len: usize) -> AllocResult<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| AllocError::out_of_memory(structure, len))?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_vec_reserves_exactly() {
        let v: Vec<u32> = try_vec("test", 16).unwrap();
        assert!(v.capacity() >= 16);
        assert!(v.is_empty());
    }

    #[test]
    fn test_try_vec_reports_overflow() {
        let err = try_vec::<u64>("test", usize::MAX).unwrap_err();
        assert_eq!(err, AllocError::out_of_memory("test", usize::MAX));
    }

    #[test]
    fn test_error_display() {
        let err = AllocError::InvalidCapacity {
            structure: "FlowMap",
            capacity: 0,
            reason: "must be non-zero",
        };
        assert_eq!(
            err.to_string(),
            "FlowMap: invalid capacity 0: must be non-zero"
        );
    }
}
