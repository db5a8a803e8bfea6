//! Container Statistics
//!
//! Relaxed atomic counters owned by one container. The owning worker bumps
//! them; a monitoring thread may read a snapshot at any time and publish it
//! through the `metrics` facade.

use std::iter::Sum;
use std::ops::Add;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-container stats (cache-line aligned)
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct ContainerStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub insertions: AtomicU64,
    pub rejuvenations: AtomicU64,
    pub removals: AtomicU64,
    pub expirations: AtomicU64,
    pub exhausted: AtomicU64,
}

impl ContainerStats {
    #[inline(always)]
    pub fn record_lookup(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline(always)]
    pub fn record_insertion(&self) {
        self.insertions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_rejuvenation(&self) {
        self.rejuvenations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_removal(&self) {
        self.removals.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_expirations(&self, n: u64) {
        self.expirations.fetch_add(n, Ordering::Relaxed);
    }

    /// An insertion was refused for lack of a free index
    #[inline(always)]
    pub fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            insertions: self.insertions.load(Ordering::Relaxed),
            rejuvenations: self.rejuvenations.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }
}

/// Stats snapshot (non-atomic)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub rejuvenations: u64,
    pub removals: u64,
    pub expirations: u64,
    pub exhausted: u64,
}

impl StatsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }

    /// Export as cumulative counters labelled with `table`
    pub fn publish(&self, table: &'static str) {
        metrics::counter!("nfstate_lookup_hits_total", "table" => table).absolute(self.hits);
        metrics::counter!("nfstate_lookup_misses_total", "table" => table).absolute(self.misses);
        metrics::counter!("nfstate_insertions_total", "table" => table).absolute(self.insertions);
        metrics::counter!("nfstate_rejuvenations_total", "table" => table)
            .absolute(self.rejuvenations);
        metrics::counter!("nfstate_removals_total", "table" => table).absolute(self.removals);
        metrics::counter!("nfstate_expirations_total", "table" => table)
            .absolute(self.expirations);
        metrics::counter!("nfstate_exhausted_total", "table" => table).absolute(self.exhausted);
    }
}

impl Add for StatsSnapshot {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            hits: self.hits + other.hits,
            misses: self.misses + other.misses,
            insertions: self.insertions + other.insertions,
            rejuvenations: self.rejuvenations + other.rejuvenations,
            removals: self.removals + other.removals,
            expirations: self.expirations + other.expirations,
            exhausted: self.exhausted + other.exhausted,
        }
    }
}

/// Totals across workers
impl Sum for StatsSnapshot {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}
