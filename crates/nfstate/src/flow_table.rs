//! Expiring Flow Table
//!
//! The usual network-function composite: a [`FlowMap`] from flow key to
//! index, an [`IndexRing`] deciding which indices are live and how old
//! they are, and two arenas holding each index's key and state.
//!
//! # Design
//!
//! - One table per worker, never shared
//! - `touch` either refreshes a known flow or claims the next free index
//! - `expire` drops every flow idle for longer than the configured time,
//!   oldest first
//! - Full tables refuse new flows; existing flows keep working

use std::fmt;

use nfstate_common::{AllocError, ConfigError, FnvKeyOps, KeyOps, TableConfig, Time};

use crate::arena::{Arena, SlotGuard};
use crate::expirator::{expiration_cutoff, expire_items_single_map};
use crate::flow_map::{FlowMap, FlowMapError};
use crate::index_ring::IndexRing;
use crate::stats::{ContainerStats, StatsSnapshot};

/// Flow table errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowTableError {
    #[error("flow table is full")]
    Full,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Alloc(#[from] AllocError),

    #[error(transparent)]
    Map(#[from] FlowMapError),
}

/// Expiring key -> state table
pub struct FlowTable<K, V, O = FnvKeyOps<K>> {
    map: FlowMap<K, usize, O>,
    keys: Arena<K>,
    values: Arena<V>,
    ring: IndexRing,
    expiration_time: Time,
    stats: ContainerStats,
}

impl<K, V> FlowTable<K, V, FnvKeyOps<K>>
where
    K: std::hash::Hash + Eq + Clone + Default,
    V: Default,
{
    /// Build with FNV hashing and `Eq` equality
    pub fn new(config: &TableConfig) -> Result<Self, FlowTableError> {
        Self::allocate(FnvKeyOps::new(), config)
    }
}

impl<K, V, O> FlowTable<K, V, O>
where
    K: Clone + Default,
    V: Default,
    O: KeyOps<K>,
{
    pub fn allocate(ops: O, config: &TableConfig) -> Result<Self, FlowTableError> {
        config.validate()?;
        let capacity = config.capacity;

        let table = Self {
            map: FlowMap::allocate(ops, capacity)?,
            keys: Arena::with_default(capacity)?,
            values: Arena::with_default(capacity)?,
            ring: IndexRing::allocate(capacity)?,
            expiration_time: config.expiration_time,
            stats: ContainerStats::default(),
        };

        tracing::debug!(
            capacity,
            expiration_ns = config.expiration_time,
            "flow table ready"
        );
        Ok(table)
    }

    /// Drop flows idle for longer than the expiration time at `now`
    pub fn expire(&mut self, now: Time) -> usize {
        let Some(cutoff) = expiration_cutoff(now, self.expiration_time) else {
            return 0;
        };

        let expired = expire_items_single_map(&mut self.ring, &self.keys, &mut self.map, cutoff);
        if expired > 0 {
            self.stats.record_expirations(expired as u64);
            tracing::debug!(expired, cutoff, remaining = self.ring.len(), "flows expired");
        }
        expired
    }

    /// Index assigned to `key`
    #[inline]
    pub fn index_of(&self, key: &K) -> Option<usize> {
        self.map.get(key)
    }

    /// State of `key`
    #[inline]
    pub fn get(&self, key: &K) -> Option<&V> {
        let found = self.map.get(key);
        self.stats.record_lookup(found.is_some());
        found.and_then(|index| self.values.get(index))
    }

    /// Scoped mutable access to the state of `key`
    #[inline]
    pub fn get_mut(&mut self, key: &K) -> Option<SlotGuard<'_, V>> {
        let found = self.map.get(key);
        self.stats.record_lookup(found.is_some());
        self.values.borrow(found?)
    }

    /// Mark `key` as seen at `now`, creating its state with `init` if the
    /// flow is new. Returns the flow's index.
    pub fn touch(
        &mut self,
        key: &K,
        now: Time,
        init: impl FnOnce() -> V,
    ) -> Result<usize, FlowTableError> {
        if let Some(index) = self.map.get(key) {
            self.ring.rejuvenate_index(index, now);
            self.stats.record_rejuvenation();
            return Ok(index);
        }

        let Some(index) = self.ring.allocate_new_index(now) else {
            self.stats.record_exhausted();
            tracing::debug!(capacity = self.capacity(), "flow table full, new flow refused");
            return Err(FlowTableError::Full);
        };

        if let Err(e) = self.map.put(key.clone(), index) {
            self.ring.free_index(index);
            return Err(e.into());
        }
        self.keys.replace(index, key.clone());
        self.values.replace(index, init());
        self.stats.record_insertion();
        Ok(index)
    }

    /// Forget `key` now, handing back its state
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let index = self.map.get(key)?;
        self.map.erase(key);
        self.ring.free_index(index);
        self.stats.record_removal();
        self.values.replace(index, V::default())
    }

    /// Live flows, oldest first
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V, Time)> + '_ {
        self.ring.iter_allocated().filter_map(|(index, stamp)| {
            Some((self.keys.get(index)?, self.values.get(index)?, stamp))
        })
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn expiration_time(&self) -> Time {
        self.expiration_time
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl<K, V, O> fmt::Debug for FlowTable<K, V, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowTable")
            .field("len", &self.ring.len())
            .field("capacity", &self.ring.capacity())
            .field("expiration_time", &self.expiration_time)
            .finish()
    }
}
