//! Execution-unit scheduling seam.
//!
//! Pools never spawn or own threads. They ask a [`Scheduler`] for an
//! exclusive unit index while they touch per-unit state, and the rotation
//! hook asks it to stop every unit while generations shift.

mod unit;

use std::marker::PhantomData;
use std::sync::Arc;

use crossbeam_utils::Backoff;

pub use unit::UnitScheduler;

/// Provider of exclusive execution-unit indices.
///
/// # Safety
///
/// Implementations must guarantee that:
///
/// - [`try_pin`](Scheduler::try_pin) never waits, and any index it returns is
///   `< unit_count()` (as observed at the moment of the call) with no other
///   caller pinned to it until the matching [`unpin`](Scheduler::unpin);
/// - between [`stop_the_world`](Scheduler::stop_the_world) and
///   [`start_the_world`](Scheduler::start_the_world) no unit is pinned.
///
/// Pools write per-unit slots without synchronization on the strength of
/// these guarantees.
pub unsafe trait Scheduler: Send + Sync {
    /// Pin the caller to a free unit and return its index.
    ///
    /// Returns `None` when every unit is held or the world is stopped.
    fn try_pin(&self) -> Option<usize>;

    /// Pin the caller, spinning until a unit is free.
    ///
    /// Pools only use [`try_pin`](Scheduler::try_pin); this is for hosts that
    /// reserve a unit for a thread of their own.
    fn pin(&self) -> usize {
        let backoff = Backoff::new();
        loop {
            if let Some(unit) = self.try_pin() {
                return unit;
            }
            backoff.snooze();
        }
    }

    /// Release a unit returned by `try_pin` or `pin`.
    fn unpin(&self, unit: usize);

    /// Current number of execution units.
    fn unit_count(&self) -> usize;

    /// Block until no unit is pinned and keep new pins out.
    fn stop_the_world(&self);

    /// Let pins proceed again.
    fn start_the_world(&self);
}

// SAFETY: forwards to a scheduler that upholds the contract.
unsafe impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
    #[inline]
    fn try_pin(&self) -> Option<usize> {
        (**self).try_pin()
    }

    fn pin(&self) -> usize {
        (**self).pin()
    }

    #[inline]
    fn unpin(&self, unit: usize) {
        (**self).unpin(unit);
    }

    #[inline]
    fn unit_count(&self) -> usize {
        (**self).unit_count()
    }

    fn stop_the_world(&self) {
        (**self).stop_the_world();
    }

    fn start_the_world(&self) {
        (**self).start_the_world();
    }
}

/// Scoped pin. Unpins on drop; tied to the pinning thread.
pub(crate) struct Pinned<'a> {
    scheduler: &'a dyn Scheduler,
    unit: usize,
    _not_send: PhantomData<*const ()>,
}

impl<'a> Pinned<'a> {
    /// Claim a unit, or `None` if none is free right now.
    #[inline]
    pub(crate) fn try_new(scheduler: &'a dyn Scheduler) -> Option<Self> {
        let unit = scheduler.try_pin()?;
        Some(Self {
            scheduler,
            unit,
            _not_send: PhantomData,
        })
    }

    #[inline]
    pub(crate) fn unit(&self) -> usize {
        self.unit
    }
}

impl Drop for Pinned<'_> {
    #[inline]
    fn drop(&mut self) {
        self.scheduler.unpin(self.unit);
    }
}

/// Scoped stop-the-world. Restarts the world on drop.
pub(crate) struct WorldStopped<'a> {
    scheduler: &'a dyn Scheduler,
}

impl<'a> WorldStopped<'a> {
    pub(crate) fn new(scheduler: &'a dyn Scheduler) -> Self {
        scheduler.stop_the_world();
        Self { scheduler }
    }
}

impl Drop for WorldStopped<'_> {
    fn drop(&mut self) {
        self.scheduler.start_the_world();
    }
}
