//! nfstate - flow state containers for packet-processing network functions
//!
//! Fixed-capacity, allocation-free structures meant to sit on a worker's
//! per-packet path. Everything is sized once at startup; afterwards no
//! operation allocates, and every operation has a bounded cost.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  WORKER (one per core)                   │
//! │                                                          │
//! │   packet ──► FlowMap ──► index ──► Arena<K>, Arena<V>    │
//! │                 ▲                 │                      │
//! │                 │ erase           ▼                      │
//! │             Expirator ◄─── IndexRing (recency, stamps)   │
//! │                                                          │
//! │   packet ──► Sketch (5 × FlowMap + IndexRing + counters) │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Building Blocks
//!
//! | Type | Role |
//! |------|------|
//! | [`Arena`] | Index-addressed records, scoped borrows |
//! | [`FlowMap`] | Open addressing with chain counts, no tombstones |
//! | [`IndexRing`] | O(1) allocate / rejuvenate / expire-oldest |
//! | [`Sketch`] | Heavy-hitter estimate with forgetting |
//! | [`DoubleMap`] | One value, two lookup keys |
//! | [`FlowTable`] | Map + ring + arenas, the usual composite |
//!
//! Workers never share a container: split capacity with
//! [`nfstate_common::per_worker_capacity`] and build one set per worker.

#![warn(missing_docs)]

pub mod arena;
pub mod double_map;
pub mod expirator;
pub mod flow_map;
pub mod flow_table;
pub mod index_ring;
pub mod sketch;
pub mod stats;

pub use arena::{Arena, SlotGuard};
pub use double_map::{DoubleKeyed, DoubleMap, DoubleMapError};
pub use expirator::{
    expiration_cutoff, expire_items_single_map, expire_items_single_map_iteratively,
};
pub use flow_map::{FlowMap, FlowMapError};
pub use flow_table::{FlowTable, FlowTableError};
pub use index_ring::IndexRing;
pub use sketch::{Sketch, SketchError, SketchHashes, SKETCH_HASHES, SKETCH_SALTS};
pub use stats::{ContainerStats, StatsSnapshot};

pub use nfstate_common::{
    AllocError, AllocResult, Clock, FlowKey, KeyOps, SketchConfig, TableConfig, Time,
};

#[cfg(test)]
mod tests {
    use super::*;
    use nfstate_common::time::NANOS_PER_SEC;
    use nfstate_common::ManualClock;

    /// A worker's firewall-style loop: heavy hitters are dropped, everything
    /// else is tracked in the flow table.
    #[test]
    fn test_worker_loop() {
        let clock = ManualClock::new(0);
        let mut flows: FlowTable<FlowKey, u64> = FlowTable::new(&TableConfig {
            capacity: 64,
            expiration_time: NANOS_PER_SEC,
        })
        .unwrap();
        let mut sketch = Sketch::allocate(FlowKey::key_ops(), 64, 3).unwrap();

        let noisy = FlowKey::new(0x0A000001, 0x0A000002, 5000, 80, 6);
        let quiet = FlowKey::new(0x0A000003, 0x0A000002, 5001, 80, 6);

        let mut dropped = 0;
        for packet in 0..10 {
            clock.advance(1000);
            let key = if packet % 5 == 0 { quiet } else { noisy };
            let now = clock.now();

            flows.expire(now);
            sketch.expire(now - NANOS_PER_SEC);

            let hashes = sketch.compute_hashes(&key);
            if sketch.fetch(&hashes) {
                dropped += 1;
                sketch.refresh(&hashes, now);
                continue;
            }
            sketch.touch(&hashes, now).unwrap();
            flows.touch(&key, now, || 0).unwrap();
            if let Some(mut packets) = flows.get_mut(&key) {
                *packets += 1;
            }
        }

        // noisy: touched 4 times before crossing, then 4 drops
        assert_eq!(dropped, 4);
        assert_eq!(flows.get(&noisy), Some(&4));
        assert_eq!(flows.get(&quiet), Some(&2));

        clock.advance(2 * NANOS_PER_SEC);
        assert_eq!(flows.expire(clock.now()), 2);
        assert!(flows.is_empty());
    }
}
