//! Index Lifecycle Ring
//!
//! Tracks which of a fixed set of indices `[0, capacity)` are allocated, in
//! strict recency order, with one timestamp per index. Every operation is
//! O(1).
//!
//! # Design
//!
//! Two circular lists share one cell array. Cell 0 heads the *allocated*
//! list (oldest at `next`, newest at `prev`), cell 1 heads the *free* list,
//! and index `i` lives in cell `i + 2`. Links are cell numbers, never
//! pointers.
//!
//! Free cells keep `prev == next`, and only a lone allocated cell also has
//! `prev == next` (both pointing at the allocated head). That is enough to
//! tell the two states apart without a separate flag.
//!
//! Because allocation and rejuvenation always append at the tail, the
//! allocated list stays sorted by last-touch time and finding the entry to
//! expire is a head peek.

use std::fmt;

use nfstate_common::config::MAX_CAPACITY;
use nfstate_common::error::try_vec;
use nfstate_common::{AllocError, AllocResult, Time};

const ALLOC_LIST_HEAD: usize = 0;
const FREE_LIST_HEAD: usize = 1;
const INDEX_SHIFT: usize = 2;

#[derive(Debug, Clone, Copy, Default)]
struct Cell {
    prev: usize,
    next: usize,
}

/// Allocation/recency tracker for a bounded index range
pub struct IndexRing {
    cells: Vec<Cell>,
    timestamps: Vec<Time>,
    allocated: usize,
}

impl IndexRing {
    /// Create a ring with every index in `[0, capacity)` free
    pub fn allocate(capacity: usize) -> AllocResult<Self> {
        if capacity == 0 || capacity > MAX_CAPACITY {
            return Err(AllocError::InvalidCapacity {
                structure: "IndexRing",
                capacity,
                reason: "must be in 1..=MAX_CAPACITY",
            });
        }

        let mut cells = try_vec("IndexRing", capacity + INDEX_SHIFT)?;
        let mut timestamps = try_vec("IndexRing", capacity)?;

        cells.push(Cell {
            prev: ALLOC_LIST_HEAD,
            next: ALLOC_LIST_HEAD,
        });
        cells.push(Cell {
            prev: INDEX_SHIFT,
            next: INDEX_SHIFT,
        });
        for cell in INDEX_SHIFT..capacity + INDEX_SHIFT - 1 {
            cells.push(Cell {
                prev: cell + 1,
                next: cell + 1,
            });
        }
        cells.push(Cell {
            prev: FREE_LIST_HEAD,
            next: FREE_LIST_HEAD,
        });
        timestamps.resize(capacity, 0);

        tracing::debug!(capacity, "index ring allocated");

        Ok(Self {
            cells,
            timestamps,
            allocated: 0,
        })
    }

    #[inline(always)]
    fn cell_of(&self, index: usize) -> Option<usize> {
        (index < self.capacity()).then_some(index + INDEX_SHIFT)
    }

    #[inline(always)]
    fn cell_allocated(&self, cell: usize) -> bool {
        let Cell { prev, next } = self.cells[cell];
        prev != next || next == ALLOC_LIST_HEAD
    }

    /// Append `cell` at the newest end of the allocated list
    #[inline(always)]
    fn link_newest(&mut self, cell: usize) {
        let tail = self.cells[ALLOC_LIST_HEAD].prev;
        self.cells[cell] = Cell {
            prev: tail,
            next: ALLOC_LIST_HEAD,
        };
        self.cells[tail].next = cell;
        self.cells[ALLOC_LIST_HEAD].prev = cell;
    }

    #[inline(always)]
    fn unlink(&mut self, cell: usize) {
        let Cell { prev, next } = self.cells[cell];
        self.cells[prev].next = next;
        self.cells[next].prev = prev;
    }

    /// Take a free index, stamp it with `now` and make it the newest.
    ///
    /// `None` when every index is allocated.
    #[inline]
    pub fn allocate_new_index(&mut self, now: Time) -> Option<usize> {
        let cell = self.cells[FREE_LIST_HEAD].next;
        if cell == FREE_LIST_HEAD {
            return None;
        }

        let after = self.cells[cell].next;
        self.cells[FREE_LIST_HEAD] = Cell {
            prev: after,
            next: after,
        };
        self.link_newest(cell);

        let index = cell - INDEX_SHIFT;
        self.timestamps[index] = now;
        self.allocated += 1;
        Some(index)
    }

    /// Restamp an allocated index with `now` and make it the newest.
    ///
    /// `false` if the index is not allocated (or out of range).
    #[inline]
    pub fn rejuvenate_index(&mut self, index: usize, now: Time) -> bool {
        let Some(cell) = self.cell_of(index) else {
            return false;
        };
        if !self.cell_allocated(cell) {
            return false;
        }

        // A lone allocated cell is already the newest
        if self.cells[cell].next != self.cells[cell].prev {
            self.unlink(cell);
            self.link_newest(cell);
        }
        self.timestamps[index] = now;
        true
    }

    /// Oldest allocated index, left allocated
    #[inline]
    pub fn oldest_index(&self) -> Option<usize> {
        let cell = self.cells[ALLOC_LIST_HEAD].next;
        (cell != ALLOC_LIST_HEAD).then(|| cell - INDEX_SHIFT)
    }

    /// Free the oldest index if it was last touched strictly before `now`
    #[inline]
    pub fn expire_one_index(&mut self, now: Time) -> Option<usize> {
        let index = self.oldest_index()?;
        if self.timestamps[index] >= now {
            return None;
        }
        self.free_index(index).then_some(index)
    }

    /// Whether `index` is currently allocated
    #[inline]
    pub fn is_index_allocated(&self, index: usize) -> bool {
        self.cell_of(index)
            .is_some_and(|cell| self.cell_allocated(cell))
    }

    /// Release an allocated index regardless of its age.
    ///
    /// `false` if it was already free (or out of range).
    #[inline]
    pub fn free_index(&mut self, index: usize) -> bool {
        let Some(cell) = self.cell_of(index) else {
            return false;
        };
        if !self.cell_allocated(cell) {
            return false;
        }

        self.unlink(cell);
        let first_free = self.cells[FREE_LIST_HEAD].next;
        self.cells[cell] = Cell {
            prev: first_free,
            next: first_free,
        };
        self.cells[FREE_LIST_HEAD] = Cell {
            prev: cell,
            next: cell,
        };
        self.allocated -= 1;
        true
    }

    /// Last-touch time of an allocated index
    #[inline]
    pub fn timestamp(&self, index: usize) -> Option<Time> {
        self.is_index_allocated(index)
            .then(|| self.timestamps[index])
    }

    /// Allocated indices from oldest to newest, with their timestamps
    pub fn iter_allocated(&self) -> impl Iterator<Item = (usize, Time)> + '_ {
        let mut cell = self.cells[ALLOC_LIST_HEAD].next;
        std::iter::from_fn(move || {
            if cell == ALLOC_LIST_HEAD {
                return None;
            }
            let index = cell - INDEX_SHIFT;
            cell = self.cells[cell].next;
            Some((index, self.timestamps[index]))
        })
    }

    /// Whether at least one index is free
    #[inline(always)]
    pub fn has_free_index(&self) -> bool {
        self.cells[FREE_LIST_HEAD].next != FREE_LIST_HEAD
    }

    /// Number of allocated indices
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.allocated
    }

    /// Check if no index is allocated
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.allocated == 0
    }

    /// Number of free indices
    #[inline(always)]
    pub fn free_count(&self) -> usize {
        self.capacity() - self.allocated
    }

    /// Size of the index range
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.timestamps.len()
    }
}

impl fmt::Debug for IndexRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexRing")
            .field("allocated", &self.allocated)
            .field("capacity", &self.capacity())
            .finish()
    }
}
