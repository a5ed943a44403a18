//! Default in-process scheduler.
//!
//! Each execution unit is a cache-padded pin flag. A thread pins by claiming
//! a free flag, starting at its home unit so that a thread tends to keep
//! hitting the same shard. If every flag is held the pin attempt fails at
//! once. Stopping the world raises a stop flag (new pins are refused) and
//! then claims every unit flag itself, which waits out any pinned section
//! still in flight.

use std::cell::Cell;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use crossbeam_utils::{Backoff, CachePadded};
use tracing::info;

use super::Scheduler;
use crate::core::limits::MAX_UNITS;
use crate::error::{PoolError, PoolResult};

static NEXT_HOME: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static HOME_UNIT: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Scheduler backed by a fixed set of pin flags
///
/// `capacity` flags are allocated up front; [`set_unit_count`] changes how
/// many of them are handed out.
///
/// [`set_unit_count`]: UnitScheduler::set_unit_count
pub struct UnitScheduler {
    units: Box<[CachePadded<AtomicBool>]>,
    active: AtomicUsize,
    stopped: AtomicBool,
}

impl UnitScheduler {
    /// Create a scheduler with `units` active units (clamped to `1..=256`).
    pub fn new(units: usize) -> Self {
        Self::build(units.clamp(1, MAX_UNITS), MAX_UNITS)
    }

    /// Create a scheduler that can grow to `capacity` units.
    pub fn with_capacity(units: usize, capacity: usize) -> PoolResult<Self> {
        if capacity == 0 || units == 0 || units > capacity {
            return Err(PoolError::invalid_unit_count(units, capacity));
        }
        Ok(Self::build(units, capacity))
    }

    /// One unit per available hardware thread.
    pub fn from_available_parallelism() -> Self {
        let units = thread::available_parallelism().map_or(1, NonZeroUsize::get);
        Self::new(units)
    }

    fn build(units: usize, capacity: usize) -> Self {
        Self {
            units: (0..capacity)
                .map(|_| CachePadded::new(AtomicBool::new(false)))
                .collect(),
            active: AtomicUsize::new(units),
            stopped: AtomicBool::new(false),
        }
    }

    /// Maximum unit count this scheduler supports.
    pub fn capacity(&self) -> usize {
        self.units.len()
    }

    /// Change the number of active units and return the previous count.
    ///
    /// `units` is clamped to `1..=capacity`. Threads already pinned to an
    /// index beyond the new count finish normally.
    pub fn set_unit_count(&self, units: usize) -> usize {
        let units = units.clamp(1, self.capacity());
        let previous = self.active.swap(units, Ordering::AcqRel);
        if previous != units {
            info!(previous, units, "execution unit count changed");
        }
        previous
    }

    /// Set the calling thread's preferred unit.
    ///
    /// The thread pins to this unit whenever it is free; the value is taken
    /// modulo the active unit count.
    pub fn set_thread_unit(unit: usize) {
        HOME_UNIT.with(|home| home.set(Some(unit)));
    }

    /// The calling thread's preferred unit, assigned round-robin on first use.
    pub fn thread_unit() -> usize {
        HOME_UNIT.with(|home| {
            home.get().unwrap_or_else(|| {
                let unit = NEXT_HOME.fetch_add(1, Ordering::Relaxed);
                home.set(Some(unit));
                unit
            })
        })
    }

    /// Whether `unit` is currently held.
    pub fn is_pinned(&self, unit: usize) -> bool {
        self.units
            .get(unit)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Whether the world is stopped (or a stop is in progress).
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn claim_free_unit(&self) -> Option<usize> {
        let count = self.unit_count();
        let home = Self::thread_unit() % count;

        (0..count).map(|k| (home + k) % count).find(|&unit| {
            self.units[unit]
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
        })
    }
}

impl Default for UnitScheduler {
    fn default() -> Self {
        Self::from_available_parallelism()
    }
}

impl std::fmt::Debug for UnitScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitScheduler")
            .field("units", &self.unit_count())
            .field("capacity", &self.capacity())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

// SAFETY: a unit index is handed out only after winning the CAS on its flag,
// and the flag is held until `unpin`. `stop_the_world` returns only after it
// has claimed every flag itself.
unsafe impl Scheduler for UnitScheduler {
    fn try_pin(&self) -> Option<usize> {
        if self.is_stopped() {
            return None;
        }
        self.claim_free_unit()
    }

    fn unpin(&self, unit: usize) {
        debug_assert!(self.is_pinned(unit), "unpin of unit {unit} that is not pinned");
        self.units[unit].store(false, Ordering::Release);
    }

    fn unit_count(&self) -> usize {
        self.active.load(Ordering::Acquire).clamp(1, self.capacity())
    }

    fn stop_the_world(&self) {
        let backoff = Backoff::new();
        while self
            .stopped
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            backoff.snooze();
        }

        for flag in &self.units[..] {
            let backoff = Backoff::new();
            while flag
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
            {
                backoff.snooze();
            }
        }
    }

    fn start_the_world(&self) {
        for flag in &self.units[..] {
            flag.store(false, Ordering::Release);
        }
        self.stopped.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_home_unit_is_preferred() {
        let scheduler = UnitScheduler::new(4);
        UnitScheduler::set_thread_unit(2);

        let unit = scheduler.pin();
        assert_eq!(unit, 2);

        // Home is busy: the next probe wins.
        let other = scheduler.pin();
        assert_eq!(other, 3);

        scheduler.unpin(other);
        scheduler.unpin(unit);
    }

    #[test]
    fn test_try_pin_fails_fast_when_all_units_held() {
        let scheduler = UnitScheduler::new(2);
        let first = scheduler.try_pin().unwrap();
        let second = scheduler.try_pin().unwrap();
        assert_ne!(first, second);
        assert_eq!(scheduler.try_pin(), None);

        scheduler.unpin(first);
        assert_eq!(scheduler.try_pin(), Some(first));
        scheduler.unpin(first);
        scheduler.unpin(second);
    }

    #[test]
    fn test_set_unit_count_clamps_and_returns_previous() {
        let scheduler = UnitScheduler::with_capacity(2, 8).unwrap();
        assert_eq!(scheduler.set_unit_count(6), 2);
        assert_eq!(scheduler.unit_count(), 6);
        assert_eq!(scheduler.set_unit_count(100), 6);
        assert_eq!(scheduler.unit_count(), 8);
        assert_eq!(scheduler.set_unit_count(0), 8);
        assert_eq!(scheduler.unit_count(), 1);
    }

    #[test]
    fn test_with_capacity_rejects_bad_counts() {
        assert!(UnitScheduler::with_capacity(0, 4).is_err());
        let err = UnitScheduler::with_capacity(5, 4).unwrap_err();
        assert_eq!(err, PoolError::invalid_unit_count(5, 4));
    }

    #[test]
    fn test_stop_the_world_waits_for_pinned_unit() {
        let scheduler = Arc::new(UnitScheduler::new(2));
        let unit = scheduler.pin();
        let stopped_at = Arc::new(AtomicUsize::new(0));

        let stopper = {
            let scheduler = Arc::clone(&scheduler);
            let stopped_at = Arc::clone(&stopped_at);
            thread::spawn(move || {
                scheduler.stop_the_world();
                stopped_at.store(1, Ordering::SeqCst);
                scheduler.start_the_world();
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(stopped_at.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_stopped());
        assert_eq!(scheduler.try_pin(), None);

        scheduler.unpin(unit);
        stopper.join().unwrap();
        assert_eq!(stopped_at.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_stopped());
    }
}
