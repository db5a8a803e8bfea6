//! Expiration helpers
//!
//! Glue between an [`IndexRing`], the arena holding each index's key and
//! the [`FlowMap`] keyed by it: whatever the ring gives up, the map forgets.

use nfstate_common::{KeyOps, Time};

use crate::arena::Arena;
use crate::flow_map::FlowMap;
use crate::index_ring::IndexRing;

/// Cutoff for entries idle longer than `ttl` at `now`.
///
/// `None` while `now < ttl`: nothing can be that old yet.
#[inline]
pub fn expiration_cutoff(now: Time, ttl: Time) -> Option<Time> {
    if now < ttl {
        None
    } else {
        Some(now - ttl)
    }
}

/// Expire every index in `ring` stamped before `cutoff`, erasing the key
/// stored for it in `keys` from `map`.
///
/// Returns the number of indices freed.
pub fn expire_items_single_map<K, V, O>(
    ring: &mut IndexRing,
    keys: &Arena<K>,
    map: &mut FlowMap<K, V, O>,
    cutoff: Time,
) -> usize
where
    V: Copy + Default,
    O: KeyOps<K>,
{
    let mut count = 0;
    while let Some(index) = ring.expire_one_index(cutoff) {
        if let Some(key) = keys.get(index) {
            map.erase(key);
        }
        count += 1;
    }
    count
}

/// Erase the keys at `keys[start..end]` from `map` without consulting any
/// ring. Used to drop a static table wholesale.
///
/// Returns the number of keys actually present in `map`.
pub fn expire_items_single_map_iteratively<K, V, O>(
    keys: &Arena<K>,
    map: &mut FlowMap<K, V, O>,
    start: usize,
    end: usize,
) -> usize
where
    V: Copy + Default,
    O: KeyOps<K>,
{
    (start..end.min(keys.capacity()))
        .filter_map(|i| keys.get(i))
        .filter(|&key| map.erase(key).is_some())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfstate_common::FlowKey;

    fn key(i: u32) -> FlowKey {
        FlowKey::new(i, 0x08080808, 1000, 53, 17)
    }

    #[test]
    fn test_cutoff() {
        assert_eq!(expiration_cutoff(5, 10), None);
        assert_eq!(expiration_cutoff(10, 10), Some(0));
        assert_eq!(expiration_cutoff(25, 10), Some(15));
        assert_eq!(expiration_cutoff(7, 0), Some(7));
    }

    #[test]
    fn test_expire_single_map() {
        let mut ring = IndexRing::allocate(8).unwrap();
        let mut keys = Arena::<FlowKey>::with_default(8).unwrap();
        let mut map: FlowMap<FlowKey> = FlowMap::new(8).unwrap();

        for (t, i) in [(10, 1u32), (20, 2), (30, 3)] {
            let index = ring.allocate_new_index(t).unwrap();
            keys.replace(index, key(i));
            map.put(key(i), index).unwrap();
        }

        assert_eq!(expire_items_single_map(&mut ring, &keys, &mut map, 10), 0);
        assert_eq!(expire_items_single_map(&mut ring, &keys, &mut map, 25), 2);
        assert_eq!(map.size(), 1);
        assert_eq!(map.get(&key(1)), None);
        assert_eq!(map.get(&key(3)), Some(2));
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn test_expire_iteratively() {
        let mut keys = Arena::<FlowKey>::with_default(4).unwrap();
        let mut map: FlowMap<FlowKey> = FlowMap::new(4).unwrap();
        for i in 0..3 {
            keys.replace(i, key(i as u32 + 1));
            map.put(key(i as u32 + 1), i).unwrap();
        }

        // Slot 3 holds the default key, which the map never saw
        assert_eq!(expire_items_single_map_iteratively(&keys, &mut map, 1, 4), 2);
        assert_eq!(map.size(), 1);
        assert_eq!(map.get(&key(1)), Some(0));
        assert_eq!(expire_items_single_map_iteratively(&keys, &mut map, 0, 100), 1);
        assert!(map.is_empty());
    }
}
