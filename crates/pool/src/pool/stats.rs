//! Statistics tracking for pools

use core::sync::atomic::{AtomicU64, Ordering};

/// Counters for pool operations
#[derive(Debug, Default)]
pub struct PoolStats {
    pub(crate) gets: AtomicU64,
    pub(crate) puts: AtomicU64,
    pub(crate) local_hits: AtomicU64,
    pub(crate) steals: AtomicU64,
    pub(crate) victim_hits: AtomicU64,
    pub(crate) misses: AtomicU64,
    pub(crate) factory_calls: AtomicU64,
    pub(crate) tables_allocated: AtomicU64,
    pub(crate) victims_dropped: AtomicU64,
    pub(crate) bypasses: AtomicU64,
}

impl PoolStats {
    pub(crate) fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    /// Served from the caller's own shard
    pub(crate) fn record_local_hit(&self) {
        self.local_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Served from another shard of the current generation
    pub(crate) fn record_steal(&self) {
        self.steals.fetch_add(1, Ordering::Relaxed);
    }

    /// Served from the victim generation
    pub(crate) fn record_victim_hit(&self) {
        self.victim_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Nothing cached; the factory (if any) decides the result
    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_factory_call(&self) {
        self.factory_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_table_allocated(&self) {
        self.tables_allocated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_victim_dropped(&self) {
        self.victims_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// No unit was free; the cache was skipped
    pub(crate) fn record_bypass(&self) {
        self.bypasses.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            gets: self.gets.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            local_hits: self.local_hits.load(Ordering::Relaxed),
            steals: self.steals.load(Ordering::Relaxed),
            victim_hits: self.victim_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            factory_calls: self.factory_calls.load(Ordering::Relaxed),
            tables_allocated: self.tables_allocated.load(Ordering::Relaxed),
            victims_dropped: self.victims_dropped.load(Ordering::Relaxed),
            bypasses: self.bypasses.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`PoolStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatsSnapshot {
    pub gets: u64,
    pub puts: u64,
    pub local_hits: u64,
    pub steals: u64,
    pub victim_hits: u64,
    pub misses: u64,
    pub factory_calls: u64,
    pub tables_allocated: u64,
    pub victims_dropped: u64,
    pub bypasses: u64,
}

impl PoolStatsSnapshot {
    /// Cached hits of any kind
    pub fn hits(&self) -> u64 {
        self.local_hits + self.steals + self.victim_hits
    }

    /// Get hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        if self.gets == 0 {
            0.0
        } else {
            self.hits() as f64 / self.gets as f64
        }
    }
}
