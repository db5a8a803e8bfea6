//! nfstate common - shared vocabulary for the flow state containers
//!
//! This crate provides the pieces every container is parameterized by:
//! - Timestamps and clock sources
//! - Key hashing/equality capabilities and the CRC digest helper
//! - Flow keys
//! - Configuration
//! - Error handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod flow;
pub mod hash;
pub mod time;

pub use config::{per_worker_capacity, SketchConfig, TableConfig, MAX_CAPACITY};
pub use error::{AllocError, AllocResult, ConfigError};
pub use flow::FlowKey;
pub use hash::{crc_digest, DigestKeyOps, FnKeyOps, FnvKeyOps, KeyOps};
pub use time::{Clock, ManualClock, MonotonicClock, Time};
