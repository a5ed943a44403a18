//! Per-unit storage and the tables that hold it.

use std::ops::Index;

use crossbeam_utils::CachePadded;

use crate::chain::Chain;
use crate::config::SegmentSizing;
use crate::core::SyncUnsafeCell;

/// One execution unit's share of a pool.
///
/// `private` and the chain head belong to the unit pinned to this shard's
/// index. Other units may only steal from the chain tail.
pub(crate) struct Shard<T> {
    private: SyncUnsafeCell<Option<T>>,
    chain: Chain<T>,
}

impl<T: Send> Shard<T> {
    fn new(sizing: SegmentSizing) -> Self {
        Self {
            private: SyncUnsafeCell::new(None),
            chain: Chain::new(sizing),
        }
    }

    /// Store `value` in the private slot, or push it to the chain head.
    ///
    /// # Safety
    ///
    /// Caller must be pinned to this shard's index.
    pub(crate) unsafe fn put(&self, value: T) {
        // SAFETY: owner-only access per the caller contract.
        let private = unsafe { &mut *self.private.get() };
        if private.is_none() {
            *private = Some(value);
        } else {
            // SAFETY: same contract.
            unsafe { self.chain.push_head(value) };
        }
    }

    /// Take the private value, else the newest chain entry.
    ///
    /// # Safety
    ///
    /// Caller must be pinned to this shard's index.
    pub(crate) unsafe fn get_local(&self) -> Option<T> {
        // SAFETY: owner-only access per the caller contract.
        unsafe { self.take_private().or_else(|| self.chain.pop_head()) }
    }

    /// # Safety
    ///
    /// Caller must be pinned to this shard's index. For a victim table this
    /// is still the pinned index: a unit only ever takes the victim private
    /// slot at its own position.
    pub(crate) unsafe fn take_private(&self) -> Option<T> {
        // SAFETY: owner-only access per the caller contract.
        unsafe { (*self.private.get()).take() }
    }

    /// Steal the oldest chain entry. Any thread may call this.
    pub(crate) fn steal(&self) -> Option<T> {
        self.chain.pop_tail()
    }
}

/// Fixed-length array of shards, indexed by unit.
///
/// Never resized in place. A table of length zero stands for "no table".
pub(crate) struct ShardTable<T> {
    shards: Box<[CachePadded<Shard<T>>]>,
}

impl<T: Send> ShardTable<T> {
    pub(crate) fn new(len: usize, sizing: SegmentSizing) -> Self {
        Self {
            shards: (0..len)
                .map(|_| CachePadded::new(Shard::new(sizing)))
                .collect(),
        }
    }

    pub(crate) fn empty() -> Self {
        Self {
            shards: Box::default(),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Shard at `index`, if the table covers it.
    #[inline]
    pub(crate) fn shard(&self, index: usize) -> Option<&Shard<T>> {
        self.shards.get(index).map(|shard| &**shard)
    }
}

impl<T: Send> Index<usize> for ShardTable<T> {
    type Output = Shard<T>;

    #[inline]
    fn index(&self, index: usize) -> &Shard<T> {
        match self.shard(index) {
            Some(shard) => shard,
            None => panic!("shard {index} out of bounds for table of {}", self.len()),
        }
    }
}
