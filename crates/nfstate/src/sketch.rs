//! Heavy-Hitter Sketch
//!
//! Count-min style frequency estimate with time-based forgetting.
//!
//! # Design
//!
//! - [`SKETCH_HASHES`] independent rows, each salted differently
//! - Each row owns a [`FlowMap`] (digest -> index) and an [`IndexRing`]
//!   (index lifecycle), so stale digests decay per row
//! - Digests and counters live in two shared arenas; row `i` uses the
//!   slice `[i * capacity, (i + 1) * capacity)`
//! - A key's estimate is the minimum over the rows where its digest is
//!   tracked; collisions can only inflate it

use std::fmt;
use std::marker::PhantomData;

use nfstate_common::config::next_power_of_two;
use nfstate_common::{
    crc_digest, AllocError, AllocResult, DigestKeyOps, FnvKeyOps, KeyOps, SketchConfig, Time,
};

use crate::arena::Arena;
use crate::flow_map::{FlowMap, FlowMapError};
use crate::index_ring::IndexRing;
use crate::stats::{ContainerStats, StatsSnapshot};

/// Rows per sketch
pub const SKETCH_HASHES: usize = 5;

/// Number of salts available
pub const SKETCH_SALTS_BANK_SIZE: usize = 64;

const _: () = assert!(SKETCH_HASHES <= SKETCH_SALTS_BANK_SIZE);

/// Per-row salts; row `i` uses `SKETCH_SALTS[i]`
pub const SKETCH_SALTS: [u32; SKETCH_SALTS_BANK_SIZE] = [
    0x9b78350f, 0x9bcf144c, 0x8ab29a3e, 0x34d48bf5, 0x78e47449, 0xd6e4af1d, 0x32ed75e2, 0xb1eb5a08,
    0x9cc7fbdf, 0x65b811ea, 0x41fd5ed9, 0x2e6a6782, 0x3549661d, 0xbb211240, 0x78daa2ae, 0x8ce2d11f,
    0x52911493, 0xc2497bd5, 0x83c232dd, 0x3e413e9f, 0x8831d191, 0x6770ac67, 0xcd1c9141, 0xad35861a,
    0xb79cd83d, 0xce3ec91f, 0x360942d1, 0x905000fa, 0x28bb469a, 0xdb239a17, 0x615cf3ae, 0xec9f7807,
    0x271dcc3c, 0x47b98e44, 0x33ff4a71, 0x02a063f8, 0xb051ebf2, 0x6f938d98, 0x2279abc3, 0xd55b01db,
    0xaa99e301, 0x95d0587c, 0xaee8684e, 0x24574971, 0x4b1e79a6, 0x4a646938, 0xa68d67f4, 0xb87839e6,
    0x8e3d388b, 0xed2af964, 0x541b83e3, 0xcb7fc8da, 0xe1140f8c, 0xe9724fd6, 0x616a78fa, 0x610cd51c,
    0x10f9173e, 0x8e180857, 0xa8f0b843, 0xd429a973, 0xceee91e5, 0x1d4c6b18, 0x2a80e6df, 0x396f4d23,
];

/// Sketch errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SketchError {
    #[error("sketch row {row} has no free index")]
    Full { row: usize },

    #[error("row map rejected digest: {0}")]
    Map(#[from] FlowMapError),
}

/// One key's digest in every row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SketchHashes([u32; SKETCH_HASHES]);

impl SketchHashes {
    /// Digest for row `i`
    #[inline(always)]
    pub fn row(&self, i: usize) -> u32 {
        self.0[i]
    }

    /// All digests
    #[inline(always)]
    pub fn as_array(&self) -> &[u32; SKETCH_HASHES] {
        &self.0
    }
}

/// Multi-row frequency sketch
pub struct Sketch<K, O = FnvKeyOps<K>> {
    capacity: usize,
    threshold: u16,
    ops: O,
    digests: Arena<u32>,
    counters: Arena<u32>,
    maps: Vec<FlowMap<u32, usize, DigestKeyOps>>,
    rings: Vec<IndexRing>,
    stats: ContainerStats,
    _key: PhantomData<fn(&K)>,
}

impl<K, O: KeyOps<K>> Sketch<K, O> {
    /// Allocate a sketch tracking up to `capacity` digests per row.
    ///
    /// Each row map gets `next_power_of_two(capacity * SKETCH_HASHES)` slots.
    pub fn allocate(ops: O, capacity: usize, threshold: u16) -> AllocResult<Self> {
        // Digests are reduced modulo capacity into a u32
        if capacity == 0 || capacity > u32::MAX as usize {
            return Err(AllocError::InvalidCapacity {
                structure: "Sketch",
                capacity,
                reason: "must be in 1..=u32::MAX",
            });
        }
        let total = capacity
            .checked_mul(SKETCH_HASHES)
            .ok_or(AllocError::InvalidCapacity {
                structure: "Sketch",
                capacity,
                reason: "row storage overflows usize",
            })?;
        let map_capacity = next_power_of_two(total);

        let digests = Arena::with_default(total)?;
        let counters = Arena::with_default(total)?;

        let mut maps = Vec::with_capacity(SKETCH_HASHES);
        let mut rings = Vec::with_capacity(SKETCH_HASHES);
        for _ in 0..SKETCH_HASHES {
            maps.push(FlowMap::allocate(DigestKeyOps, map_capacity)?);
            rings.push(IndexRing::allocate(capacity)?);
        }

        tracing::debug!(capacity, threshold, map_capacity, "sketch allocated");

        Ok(Self {
            capacity,
            threshold,
            ops,
            digests,
            counters,
            maps,
            rings,
            stats: ContainerStats::default(),
            _key: PhantomData,
        })
    }

    /// Allocate from configuration
    pub fn from_config(ops: O, config: &SketchConfig) -> AllocResult<Self> {
        Self::allocate(ops, config.capacity, config.threshold)
    }

    #[inline(always)]
    fn slot(&self, row: usize, index: usize) -> usize {
        row * self.capacity + index
    }

    /// Salted per-row digests of `key`, each reduced into `[0, capacity)`
    #[inline]
    pub fn compute_hashes(&self, key: &K) -> SketchHashes {
        let kh = self.ops.key_hash(key);
        let mut hashes = [0u32; SKETCH_HASHES];
        for (i, h) in hashes.iter_mut().enumerate() {
            *h = crc_digest(crc_digest(0, SKETCH_SALTS[i]), kh) % self.capacity as u32;
        }
        SketchHashes(hashes)
    }

    /// Record one occurrence of the key behind `hashes` at time `now`.
    ///
    /// Rows that already track the digest are rejuvenated and their counter
    /// incremented (saturating); other rows allocate a fresh index with a
    /// zero counter. If any row that needs an index has none free, returns
    /// [`SketchError::Full`] and no row is modified.
    pub fn touch(&mut self, hashes: &SketchHashes, now: Time) -> Result<(), SketchError> {
        let mut present = [None; SKETCH_HASHES];
        for (row, slot) in present.iter_mut().enumerate() {
            *slot = self.maps[row].get(&hashes.row(row));
            if slot.is_none() && !self.rings[row].has_free_index() {
                self.stats.record_exhausted();
                tracing::debug!(row, "sketch row full");
                return Err(SketchError::Full { row });
            }
        }

        for (row, found) in present.into_iter().enumerate() {
            match found {
                Some(index) => {
                    self.rings[row].rejuvenate_index(index, now);
                    let slot = self.slot(row, index);
                    self.counters.with_slot(slot, |c| *c = c.saturating_add(1));
                    self.stats.record_rejuvenation();
                }
                None => {
                    let Some(index) = self.rings[row].allocate_new_index(now) else {
                        return Err(SketchError::Full { row });
                    };
                    let digest = hashes.row(row);
                    let slot = self.slot(row, index);
                    self.digests.replace(slot, digest);
                    self.counters.replace(slot, 0);
                    self.maps[row].put(digest, index)?;
                    self.stats.record_insertion();
                }
            }
        }

        Ok(())
    }

    /// Occurrences of the key behind `hashes`: the smallest count among the
    /// rows tracking it, `None` if no row does.
    #[inline]
    pub fn estimate(&self, hashes: &SketchHashes) -> Option<u32> {
        let mut min: Option<u32> = None;
        for row in 0..SKETCH_HASHES {
            let found = self.maps[row].get(&hashes.row(row));
            self.stats.record_lookup(found.is_some());
            let Some(index) = found else {
                continue;
            };
            // The allocating touch stored zero
            let Some(counter) = self.counters.get(self.slot(row, index)) else {
                continue;
            };
            let seen = counter.saturating_add(1);
            min = Some(min.map_or(seen, |m| m.min(seen)));
        }
        min
    }

    /// Whether the key behind `hashes` has been seen more than `threshold`
    /// times within the retention window
    #[inline]
    pub fn fetch(&self, hashes: &SketchHashes) -> bool {
        self.estimate(hashes)
            .is_some_and(|seen| seen > self.threshold as u32)
    }

    /// Keep the key's digests alive without counting an occurrence
    #[inline]
    pub fn refresh(&mut self, hashes: &SketchHashes, now: Time) {
        for row in 0..SKETCH_HASHES {
            if let Some(index) = self.maps[row].get(&hashes.row(row)) {
                self.rings[row].rejuvenate_index(index, now);
            }
        }
    }

    /// Forget every digest last touched before `now`, row by row.
    ///
    /// Returns how many digests were dropped.
    pub fn expire(&mut self, now: Time) -> usize {
        let mut expired = 0;
        for row in 0..SKETCH_HASHES {
            while let Some(index) = self.rings[row].expire_one_index(now) {
                let slot = self.slot(row, index);
                if let Some(digest) = self.digests.get(slot).copied() {
                    self.maps[row].erase(&digest);
                }
                expired += 1;
            }
        }

        if expired > 0 {
            self.stats.record_expirations(expired as u64);
            tracing::trace!(expired, now, "sketch digests expired");
        }
        expired
    }

    /// Digests currently tracked by `row`
    pub fn row_len(&self, row: usize) -> usize {
        self.rings.get(row).map_or(0, IndexRing::len)
    }

    /// Digests tracked per row at most
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Heavy-hitter threshold
    #[inline(always)]
    pub fn threshold(&self) -> u16 {
        self.threshold
    }

    /// Counters so far
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl<K, O> fmt::Debug for Sketch<K, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sketch")
            .field("capacity", &self.capacity)
            .field("threshold", &self.threshold)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfstate_common::{FlowKey, FnKeyOps};

    fn flow(i: u32) -> FlowKey {
        FlowKey::new(0x0A000000 + i, 0x08080808, 40000, 443, 6)
    }

    fn sketch(capacity: usize, threshold: u16) -> Sketch<FlowKey, FnKeyOps<FlowKey>> {
        Sketch::allocate(FlowKey::key_ops(), capacity, threshold).unwrap()
    }

    #[test]
    fn test_hashes_in_range_and_stable() {
        let s = sketch(100, 1);
        let h1 = s.compute_hashes(&flow(1));
        let h2 = s.compute_hashes(&flow(1));

        assert_eq!(h1, h2);
        assert!(h1.as_array().iter().all(|&h| h < 100));
    }

    #[test]
    fn test_rows_use_different_salts() {
        let s = sketch(1 << 16, 1);
        let h = s.compute_hashes(&flow(7));
        let distinct: std::collections::HashSet<_> = h.as_array().iter().collect();
        assert!(distinct.len() > 1);
    }

    #[test]
    fn test_threshold_crossing() {
        let mut s = sketch(64, 3);
        let h = s.compute_hashes(&flow(1));

        assert!(!s.fetch(&h));
        assert_eq!(s.estimate(&h), None);

        s.touch(&h, 1).unwrap();
        assert_eq!(s.estimate(&h), Some(1));
        assert!(!s.fetch(&h));

        for t in 2..=4 {
            s.touch(&h, t).unwrap();
        }
        assert_eq!(s.estimate(&h), Some(4));
        assert!(s.fetch(&h));
    }

    #[test]
    fn test_single_touch_is_not_heavy() {
        let mut s = sketch(64, 1);
        let h = s.compute_hashes(&flow(9));
        s.touch(&h, 0).unwrap();
        assert!(!s.fetch(&h));
    }

    #[test]
    fn test_expire_forgets() {
        let mut s = sketch(64, 1);
        let h = s.compute_hashes(&flow(1));
        s.touch(&h, 10).unwrap();
        s.touch(&h, 10).unwrap();
        s.touch(&h, 10).unwrap();
        assert!(s.fetch(&h));

        assert_eq!(s.expire(10), 0);
        assert!(s.fetch(&h));

        assert_eq!(s.expire(11), SKETCH_HASHES);
        assert!(!s.fetch(&h));
        assert_eq!(s.estimate(&h), None);
        for row in 0..SKETCH_HASHES {
            assert_eq!(s.row_len(row), 0);
        }
    }

    #[test]
    fn test_refresh_keeps_alive_without_counting() {
        let mut s = sketch(64, 1);
        let h = s.compute_hashes(&flow(1));
        s.touch(&h, 10).unwrap();

        s.refresh(&h, 20);
        assert_eq!(s.estimate(&h), Some(1));
        assert_eq!(s.expire(15), 0);
        assert_eq!(s.estimate(&h), Some(1));
        assert_eq!(s.expire(21), SKETCH_HASHES);
    }

    #[test]
    fn test_full_sketch_is_all_or_nothing() {
        let mut s = sketch(2, 1);
        let zero = SketchHashes([0; SKETCH_HASHES]);
        let one = SketchHashes([1; SKETCH_HASHES]);
        s.touch(&zero, 1).unwrap();
        s.touch(&one, 1).unwrap();

        // Every row has both indices in use
        let third = SketchHashes([2; SKETCH_HASHES]);
        assert_eq!(s.touch(&third, 2), Err(SketchError::Full { row: 0 }));
        assert_eq!(s.estimate(&third), None);
        assert_eq!(s.estimate(&zero), Some(1));
        assert_eq!(s.stats().exhausted, 1);

        // Present keys still count
        s.touch(&zero, 3).unwrap();
        assert!(s.fetch(&zero));
    }

    #[test]
    fn test_touch_rejected_leaves_rows_untouched() {
        let mut s = sketch(1, 1);
        let zero = SketchHashes([0; SKETCH_HASHES]);
        s.touch(&zero, 5).unwrap();

        // Differs from `zero` only in the last row
        let mut other = [0u32; SKETCH_HASHES];
        other[SKETCH_HASHES - 1] = 1;
        let other = SketchHashes(other);

        assert_eq!(
            s.touch(&other, 6),
            Err(SketchError::Full {
                row: SKETCH_HASHES - 1
            })
        );
        // Rows 0..4 were not incremented by the rejected touch
        assert_eq!(s.estimate(&zero), Some(1));
        assert_eq!(s.rings[0].timestamp(0), Some(5));
    }

    #[test]
    fn test_counter_saturates() {
        let mut s = sketch(4, 1);
        let h = s.compute_hashes(&flow(3));
        s.touch(&h, 0).unwrap();
        for row in 0..SKETCH_HASHES {
            let index = s.maps[row].get(&h.row(row)).unwrap();
            let slot = s.slot(row, index);
            s.counters.replace(slot, u32::MAX - 1);
        }

        s.touch(&h, 1).unwrap();
        s.touch(&h, 2).unwrap();
        assert_eq!(s.estimate(&h), Some(u32::MAX));
    }

    #[test]
    fn test_invalid_capacity() {
        assert!(Sketch::<FlowKey>::allocate(FnvKeyOps::new(), 0, 1).is_err());
    }
}
