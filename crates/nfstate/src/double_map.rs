//! Double-keyed map
//!
//! One value per index, findable by either of two keys derived from it.
//! NAT-style tables use this to look a session up from the internal
//! and the external side.

use std::fmt;

use nfstate_common::{AllocResult, FnvKeyOps, KeyOps, Time};

use crate::arena::Arena;
use crate::flow_map::{FlowMap, FlowMapError};
use crate::index_ring::IndexRing;

/// Values that carry both of their lookup keys
pub trait DoubleKeyed {
    type KeyA;
    type KeyB;

    fn key_a(&self) -> Self::KeyA;
    fn key_b(&self) -> Self::KeyB;
}

/// Double map errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DoubleMapError {
    #[error("index {index} is out of range for capacity {capacity}")]
    IndexOutOfRange { index: usize, capacity: usize },

    #[error("index {0} already holds a value")]
    IndexInUse(usize),

    #[error("first key is already mapped")]
    DuplicateKeyA,

    #[error("second key is already mapped")]
    DuplicateKeyB,

    #[error(transparent)]
    Map(#[from] FlowMapError),
}

/// Two [`FlowMap`]s over one value arena
pub struct DoubleMap<
    V: DoubleKeyed,
    OA = FnvKeyOps<<V as DoubleKeyed>::KeyA>,
    OB = FnvKeyOps<<V as DoubleKeyed>::KeyB>,
> {
    map_a: FlowMap<V::KeyA, usize, OA>,
    map_b: FlowMap<V::KeyB, usize, OB>,
    values: Arena<Option<V>>,
    size: usize,
}

impl<V> DoubleMap<V>
where
    V: DoubleKeyed,
    V::KeyA: std::hash::Hash + Eq,
    V::KeyB: std::hash::Hash + Eq,
{
    /// Allocate with FNV hashing on both keys
    pub fn new(capacity: usize) -> AllocResult<Self> {
        Self::allocate(FnvKeyOps::new(), FnvKeyOps::new(), capacity)
    }
}

impl<V, OA, OB> DoubleMap<V, OA, OB>
where
    V: DoubleKeyed,
    OA: KeyOps<V::KeyA>,
    OB: KeyOps<V::KeyB>,
{
    pub fn allocate(ops_a: OA, ops_b: OB, capacity: usize) -> AllocResult<Self> {
        Ok(Self {
            map_a: FlowMap::allocate(ops_a, capacity)?,
            map_b: FlowMap::allocate(ops_b, capacity)?,
            values: Arena::allocate(capacity, |_| None)?,
            size: 0,
        })
    }

    /// Index of the value whose first key is `key`
    #[inline]
    pub fn get_a(&self, key: &V::KeyA) -> Option<usize> {
        self.map_a.get(key)
    }

    /// Index of the value whose second key is `key`
    #[inline]
    pub fn get_b(&self, key: &V::KeyB) -> Option<usize> {
        self.map_b.get(key)
    }

    /// Store `value` at `index` under both of its keys.
    ///
    /// Nothing changes unless the index is free and neither key is mapped.
    pub fn put(&mut self, value: V, index: usize) -> Result<(), DoubleMapError> {
        match self.values.get(index) {
            None => {
                return Err(DoubleMapError::IndexOutOfRange {
                    index,
                    capacity: self.capacity(),
                })
            }
            Some(Some(_)) => return Err(DoubleMapError::IndexInUse(index)),
            Some(None) => {}
        }

        let key_a = value.key_a();
        let key_b = value.key_b();
        if self.map_a.contains_key(&key_a) {
            return Err(DoubleMapError::DuplicateKeyA);
        }
        if self.map_b.contains_key(&key_b) {
            return Err(DoubleMapError::DuplicateKeyB);
        }

        self.map_a.put(key_a, index)?;
        if let Err(e) = self.map_b.put(key_b, index) {
            self.map_a.erase(&value.key_a());
            return Err(e.into());
        }
        self.values.replace(index, Some(value));
        self.size += 1;
        Ok(())
    }

    #[inline]
    pub fn get_value(&self, index: usize) -> Option<&V> {
        self.values.get(index).and_then(Option::as_ref)
    }

    /// Remove the value at `index` and both of its keys
    pub fn erase(&mut self, index: usize) -> Option<V> {
        let value = self.values.replace(index, None).flatten()?;
        self.map_a.erase(&value.key_a());
        self.map_b.erase(&value.key_b());
        self.size -= 1;
        Some(value)
    }

    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.values.capacity()
    }

    /// Erase every value whose index `ring` expires before `cutoff`
    pub fn expire_items(&mut self, ring: &mut IndexRing, cutoff: Time) -> usize {
        let mut count = 0;
        while let Some(index) = ring.expire_one_index(cutoff) {
            self.erase(index);
            count += 1;
        }
        count
    }
}

impl<V: DoubleKeyed, OA, OB> fmt::Debug for DoubleMap<V, OA, OB> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoubleMap")
            .field("size", &self.size)
            .field("capacity", &self.values.capacity())
            .finish()
    }
}
