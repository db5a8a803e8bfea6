//! Open-Addressing Flow Map
//!
//! Fixed-capacity hash map from a key to a small copyable value (usually an
//! arena index), built for per-packet lookups.
//!
//! # Design
//!
//! - Parallel arrays over a power-of-two slot space, linear probing
//! - No tombstones: every slot carries a *chain count*, the number of live
//!   keys whose insertion probe had to pass over it. A lookup stops at the
//!   first non-matching slot with a zero chain count, so a miss costs as
//!   much as the real collision history around its home slot, not a scan
//! - `erase` walks the same probe and gives back the passes its key made
//! - Never resizes; capacity is fixed at allocation

use std::fmt;

use nfstate_common::error::try_vec;
use nfstate_common::{AllocError, AllocResult, FnvKeyOps, KeyOps};

/// Flow map errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowMapError {
    #[error("key is already present")]
    DuplicateKey,

    #[error("flow map is full")]
    Full,
}

/// Fixed-capacity open-addressing map
pub struct FlowMap<K, V = usize, O = FnvKeyOps<K>> {
    /// Stored key per slot; `Some` marks the slot busy
    keys: Vec<Option<K>>,
    /// Full hash of the stored key
    hashes: Vec<u32>,
    /// Live probes passing over each slot
    chains: Vec<u32>,
    values: Vec<V>,
    /// Slot count minus one (slot count is a power of 2)
    mask: usize,
    size: usize,
    ops: O,
}

impl<K, V> FlowMap<K, V, FnvKeyOps<K>>
where
    K: std::hash::Hash + Eq,
    V: Copy + Default,
{
    /// Allocate with FNV hashing and `Eq` equality
    pub fn new(capacity: usize) -> AllocResult<Self> {
        Self::allocate(FnvKeyOps::new(), capacity)
    }
}

impl<K, V, O> FlowMap<K, V, O>
where
    V: Copy + Default,
    O: KeyOps<K>,
{
    /// Allocate an empty map.
    ///
    /// `capacity` is rounded up to the next power of two.
    pub fn allocate(ops: O, capacity: usize) -> AllocResult<Self> {
        let slots = match capacity.checked_next_power_of_two() {
            Some(n) if capacity > 0 => n,
            _ => {
                return Err(AllocError::InvalidCapacity {
                    structure: "FlowMap",
                    capacity,
                    reason: "must be non-zero and have a power of two above it",
                })
            }
        };

        let mut keys = try_vec("FlowMap", slots)?;
        let mut hashes = try_vec("FlowMap", slots)?;
        let mut chains = try_vec("FlowMap", slots)?;
        let mut values = try_vec("FlowMap", slots)?;

        keys.resize_with(slots, || None);
        hashes.resize(slots, 0);
        chains.resize(slots, 0);
        values.resize(slots, V::default());

        tracing::debug!(requested = capacity, slots, "flow map allocated");

        Ok(Self {
            keys,
            hashes,
            chains,
            values,
            mask: slots - 1,
            size: 0,
            ops,
        })
    }

    /// Slot holding `key`, if present
    #[inline]
    fn find_key(&self, key: &K, hash: u32) -> Option<usize> {
        let start = hash as usize & self.mask;

        for i in 0..self.capacity() {
            let idx = (start + i) & self.mask;
            match &self.keys[idx] {
                Some(stored) if self.hashes[idx] == hash && self.ops.key_eq(stored, key) => {
                    return Some(idx);
                }
                _ => {
                    // No live key was ever pushed past this slot
                    if self.chains[idx] == 0 {
                        return None;
                    }
                }
            }
        }

        None
    }

    /// First empty slot from `start`, charging every busy slot passed over.
    /// Caller guarantees one exists.
    #[inline]
    fn claim_empty(&mut self, start: usize) -> usize {
        let mut idx = start;
        while self.keys[idx].is_some() {
            self.chains[idx] += 1;
            idx = (idx + 1) & self.mask;
        }
        idx
    }

    /// Value stored for `key`
    #[inline]
    pub fn get(&self, key: &K) -> Option<V> {
        let hash = self.ops.key_hash(key);
        self.find_key(key, hash).map(|idx| self.values[idx])
    }

    /// Whether `key` is present
    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        let hash = self.ops.key_hash(key);
        self.find_key(key, hash).is_some()
    }

    /// Insert `key -> value`.
    ///
    /// The key must be absent: re-putting a present key is rejected with
    /// [`FlowMapError::DuplicateKey`] and leaves the map unchanged.
    #[inline]
    pub fn put(&mut self, key: K, value: V) -> Result<(), FlowMapError> {
        let hash = self.ops.key_hash(&key);
        if self.find_key(&key, hash).is_some() {
            return Err(FlowMapError::DuplicateKey);
        }
        if self.size == self.capacity() {
            return Err(FlowMapError::Full);
        }

        let idx = self.claim_empty(hash as usize & self.mask);
        self.keys[idx] = Some(key);
        self.hashes[idx] = hash;
        self.values[idx] = value;
        self.size += 1;
        Ok(())
    }

    /// Remove `key`, handing back the stored key
    #[inline]
    pub fn erase(&mut self, key: &K) -> Option<K> {
        let hash = self.ops.key_hash(key);
        let found = self.find_key(key, hash)?;

        let mut idx = hash as usize & self.mask;
        while idx != found {
            debug_assert!(self.chains[idx] > 0, "chain count underflow at slot {idx}");
            self.chains[idx] = self.chains[idx].saturating_sub(1);
            idx = (idx + 1) & self.mask;
        }

        self.size -= 1;
        self.keys[found].take()
    }

    /// Number of live keys
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Check if empty
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Slot count (power of two)
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Get load factor
    pub fn load_factor(&self) -> f64 {
        self.size as f64 / self.capacity() as f64
    }

    /// Live entries in slot order
    pub fn iter(&self) -> impl Iterator<Item = (&K, V)> + '_ {
        self.keys
            .iter()
            .zip(self.values.iter())
            .filter_map(|(k, v)| k.as_ref().map(|k| (k, *v)))
    }
}

impl<K, V, O> fmt::Debug for FlowMap<K, V, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowMap")
            .field("size", &self.size)
            .field("capacity", &(self.mask + 1))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfstate_common::{FlowKey, FnKeyOps};

    /// Hash is the key itself, so tests pick home slots directly
    fn identity_ops() -> FnKeyOps<u32> {
        fn eq(a: &u32, b: &u32) -> bool {
            a == b
        }
        fn hash(k: &u32) -> u32 {
            *k
        }
        FnKeyOps::new(eq, hash)
    }

    fn identity_map(capacity: usize) -> FlowMap<u32, i32, FnKeyOps<u32>> {
        FlowMap::allocate(identity_ops(), capacity).unwrap()
    }

    #[test]
    fn test_put_get() {
        let mut map: FlowMap<FlowKey> = FlowMap::new(1024).unwrap();
        let key = FlowKey::new(0xC0A80101, 0x08080808, 12345, 443, 6);

        map.put(key, 7).unwrap();

        assert_eq!(map.size(), 1);
        assert_eq!(map.get(&key), Some(7));
        assert_eq!(map.get(&key.reverse()), None);
    }

    #[test]
    fn test_capacity_rounds_up() {
        let map: FlowMap<u64> = FlowMap::new(1000).unwrap();
        assert_eq!(map.capacity(), 1024);

        let empty: AllocResult<FlowMap<u64>> = FlowMap::new(0);
        assert!(empty.is_err());
    }

    #[test]
    fn test_erase_collision_scenario() {
        // A and B share home slot 1, C lands back in A's slot
        let (a, b, c) = (1u32, 5u32, 9u32);
        let mut map = identity_map(4);

        map.put(a, 1).unwrap();
        map.put(b, 2).unwrap();
        assert_eq!(map.erase(&a), Some(a));
        map.put(c, 3).unwrap();

        assert_eq!(map.get(&a), None);
        assert_eq!(map.get(&b), Some(2));
        assert_eq!(map.get(&c), Some(3));
        assert_eq!(map.size(), 2);
    }

    #[test]
    fn test_chain_counts_follow_probes() {
        let mut map = identity_map(8);

        map.put(2, 0).unwrap();
        map.put(10, 0).unwrap(); // home 2, lands in 3
        map.put(18, 0).unwrap(); // home 2, lands in 4
        assert_eq!(&map.chains[2..5], &[2, 1, 0]);

        map.erase(&18).unwrap();
        assert_eq!(&map.chains[2..5], &[1, 0, 0]);

        map.erase(&2).unwrap();
        assert_eq!(map.chains[2], 1);
        assert_eq!(map.get(&10), Some(0));

        map.erase(&10).unwrap();
        assert!(map.chains.iter().all(|&c| c == 0));
        assert!(map.is_empty());
    }

    #[test]
    fn test_miss_stops_at_zero_chain() {
        let mut map = identity_map(8);
        map.put(3, 1).unwrap();

        // Home slot 3 is busy with another key and nothing was pushed past it
        assert_eq!(map.get(&11), None);
        // Home slot empty
        assert_eq!(map.get(&4), None);
    }

    #[test]
    fn test_duplicate_put_rejected() {
        let mut map = identity_map(4);
        map.put(1, 10).unwrap();

        assert_eq!(map.put(1, 20), Err(FlowMapError::DuplicateKey));
        assert_eq!(map.get(&1), Some(10));
        assert_eq!(map.size(), 1);
    }

    #[test]
    fn test_full_map_rejects() {
        let mut map = identity_map(4);
        for k in 0..4 {
            map.put(k, k as i32).unwrap();
        }

        assert_eq!(map.put(4, 0), Err(FlowMapError::Full));
        assert_eq!(map.size(), 4);
        for k in 0..4 {
            assert_eq!(map.get(&k), Some(k as i32));
        }
        // Full table with all chain counts zero still terminates
        assert_eq!(map.get(&100), None);
    }

    #[test]
    fn test_erase_absent_is_noop() {
        let mut map = identity_map(4);
        map.put(1, 1).unwrap();
        map.put(5, 5).unwrap();

        assert_eq!(map.erase(&9), None);
        assert_eq!(map.size(), 2);
        assert_eq!(map.chains[1], 1);
    }

    #[test]
    fn test_wraparound_probe() {
        let mut map = identity_map(4);
        map.put(3, 30).unwrap();
        map.put(7, 70).unwrap(); // home 3, wraps to 0

        assert_eq!(map.get(&7), Some(70));
        assert_eq!(map.erase(&7), Some(7));
        assert_eq!(map.chains[3], 0);
        assert_eq!(map.get(&7), None);
    }

    #[test]
    fn test_iter() {
        let mut map = identity_map(8);
        map.put(1, 10).unwrap();
        map.put(2, 20).unwrap();

        let mut entries: Vec<_> = map.iter().map(|(k, v)| (*k, v)).collect();
        entries.sort();
        assert_eq!(entries, vec![(1, 10), (2, 20)]);
        assert!((map.load_factor() - 0.25).abs() < f64::EPSILON);
    }
}
