//! Fixed-capacity record arena
//!
//! Index-addressed storage for fixed-size records.
//!
//! # Design
//!
//! - Every slot is initialized at creation, so every index in
//!   `[0, capacity)` always denotes a valid record
//! - Slots are overwritten in place, never moved, freed or reallocated
//! - Which slots are "live" is decided by the owning map/ring, not here
//! - Mutable access is scoped: [`Arena::borrow`] hands out a guard that
//!   returns the slot when it goes out of scope

use std::fmt;
use std::ops::{Deref, DerefMut};

use nfstate_common::error::try_vec;
use nfstate_common::{AllocError, AllocResult};

/// Fixed array of records addressed by integer index
pub struct Arena<T> {
    slots: Vec<T>,
}

impl<T> Arena<T> {
    /// Allocate `capacity` slots, running `init` once per index.
    ///
    /// Fails without leaving anything behind when storage cannot be reserved.
    pub fn allocate(capacity: usize, mut init: impl FnMut(usize) -> T) -> AllocResult<Self> {
        if capacity == 0 {
            return Err(AllocError::InvalidCapacity {
                structure: "Arena",
                capacity,
                reason: "must be non-zero",
            });
        }

        let mut slots = try_vec("Arena", capacity)?;
        for i in 0..capacity {
            slots.push(init(i));
        }

        tracing::debug!(
            capacity,
            elem_size = std::mem::size_of::<T>(),
            "arena allocated"
        );

        Ok(Self { slots })
    }

    /// Allocate with every slot set to `T::default()`
    pub fn with_default(capacity: usize) -> AllocResult<Self>
    where
        T: Default,
    {
        Self::allocate(capacity, |_| T::default())
    }

    /// Exclusive access to slot `index` until the guard is dropped.
    ///
    /// Do not hold a guard across another operation on the same index.
    #[inline]
    pub fn borrow(&mut self, index: usize) -> Option<SlotGuard<'_, T>> {
        self.slots
            .get_mut(index)
            .map(|slot| SlotGuard { slot, index })
    }

    /// Shared read access to slot `index`
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)
    }

    /// Run `f` on slot `index`, returning the slot before this returns
    #[inline]
    pub fn with_slot<R>(&mut self, index: usize, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.borrow(index).map(|mut guard| f(&mut *guard))
    }

    /// Overwrite slot `index`, returning the previous record
    #[inline]
    pub fn replace(&mut self, index: usize, value: T) -> Option<T> {
        self.slots
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, value))
    }

    /// Number of slots (fixed at creation)
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Size in bytes of one record
    #[inline(always)]
    pub const fn elem_size(&self) -> usize {
        std::mem::size_of::<T>()
    }
}

impl<T: fmt::Debug> fmt::Debug for Arena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity())
            .field("elem_size", &self.elem_size())
            .finish()
    }
}

/// Borrowed arena slot
pub struct SlotGuard<'a, T> {
    slot: &'a mut T,
    index: usize,
}

impl<'a, T> SlotGuard<'a, T> {
    /// Index of the borrowed slot
    #[inline(always)]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Return the slot to the arena
    #[inline(always)]
    pub fn release(self) {}
}

impl<'a, T> Deref for SlotGuard<'a, T> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        self.slot
    }
}

impl<'a, T> DerefMut for SlotGuard<'a, T> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut T {
        self.slot
    }
}
