//! Runtime: one scheduler, one registry, and the rotation hook.
//!
//! A process normally uses [`Runtime::global`]. Isolated runtimes are useful
//! for tests and for embedding several independent pool families.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::error::{PoolError, PoolResult};
use crate::registry::Registry;
use crate::sched::{Scheduler, UnitScheduler, WorldStopped};

static GLOBAL: LazyLock<Arc<Runtime>> =
    LazyLock::new(|| Runtime::new(UnitScheduler::from_available_parallelism()));

/// Scheduler and registry shared by a family of pools
pub struct Runtime {
    scheduler: Box<dyn Scheduler>,
    registry: Registry,
    generation: AtomicU64,
}

/// Outcome of one [`Runtime::rotate`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationReport {
    /// Generation number after this rotation (starts at 1)
    pub generation: u64,
    /// Live pools rotated
    pub pools: usize,
    /// Registry entries removed because their pool was dropped
    pub pruned: usize,
    /// Non-empty tables released by this rotation
    pub evicted_tables: usize,
}

impl Runtime {
    /// Create a runtime around `scheduler`
    pub fn new<S: Scheduler + 'static>(scheduler: S) -> Arc<Self> {
        Arc::new(Self {
            scheduler: Box::new(scheduler),
            registry: Registry::new(),
            generation: AtomicU64::new(0),
        })
    }

    /// Process-wide runtime backed by a [`UnitScheduler`] sized to the host
    pub fn global() -> &'static Arc<Self> {
        &GLOBAL
    }

    pub fn scheduler(&self) -> &dyn Scheduler {
        &*self.scheduler
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Number of completed rotations
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Shift every registered pool by one generation.
    ///
    /// Each pool's victim is dropped and its current table becomes the new
    /// victim. Must not be called from a thread that is inside a pool
    /// operation (for instance from a factory).
    pub fn rotate(&self) -> RotationReport {
        let mut state = self.registry.lock();
        let (live, pruned) = state.collect_live();

        let mut retired = Vec::new();
        let mut keep = Vec::new();
        let generation = {
            let _stopped = WorldStopped::new(&*self.scheduler);
            for (id, pool) in &live {
                let rotation = pool.rotate();
                retired.extend(rotation.retired);
                if rotation.holds_victim {
                    keep.push(*id);
                }
            }
            self.generation.fetch_add(1, Ordering::AcqRel) + 1
        };

        state.retain_only(&keep);
        drop(state);

        let report = RotationReport {
            generation,
            pools: live.len(),
            pruned,
            evicted_tables: retired.len(),
        };

        // Item destructors run here, outside the lock and with the world running.
        drop(retired);
        drop(live);

        debug!(
            generation = report.generation,
            pools = report.pools,
            pruned = report.pruned,
            evicted_tables = report.evicted_tables,
            "rotated pool generations"
        );
        report
    }

    /// Run [`rotate`](Runtime::rotate) every `interval` on a background
    /// thread until the returned handle is stopped or dropped.
    pub fn spawn_collector(self: &Arc<Self>, interval: Duration) -> PoolResult<CollectorHandle> {
        let shared = Arc::new(CollectorShared {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        });

        let runtime = Arc::downgrade(self);
        let thread = thread::Builder::new()
            .name("nebula-pool-collector".into())
            .spawn({
                let shared = Arc::clone(&shared);
                move || collector_loop(&runtime, &shared, interval)
            })
            .map_err(|err| PoolError::collector_spawn(&err))?;

        info!(interval_ms = interval.as_millis() as u64, "pool collector started");
        Ok(CollectorHandle {
            shared,
            thread: Some(thread),
        })
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("units", &self.scheduler.unit_count())
            .field("registry", &self.registry)
            .field("generation", &self.generation())
            .finish()
    }
}

struct CollectorShared {
    stopped: Mutex<bool>,
    wake: Condvar,
}

fn collector_loop(runtime: &Weak<Runtime>, shared: &CollectorShared, interval: Duration) {
    let mut stopped = shared.stopped.lock();
    while !*stopped {
        let timed_out = shared.wake.wait_for(&mut stopped, interval).timed_out();
        if *stopped {
            break;
        }
        if !timed_out {
            continue;
        }

        let Some(runtime) = runtime.upgrade() else {
            break;
        };
        MutexGuard::unlocked(&mut stopped, || {
            runtime.rotate();
        });
    }
}

/// Handle to a running collector thread
///
/// Dropping the handle stops the thread and waits for it to exit.
pub struct CollectorHandle {
    shared: Arc<CollectorShared>,
    thread: Option<JoinHandle<()>>,
}

impl CollectorHandle {
    /// Stop the collector and wait for it to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        *self.shared.stopped.lock() = true;
        self.shared.wake.notify_all();

        if thread.join().is_err() {
            warn!("pool collector thread panicked");
        } else {
            info!("pool collector stopped");
        }
    }
}

impl Drop for CollectorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for CollectorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorHandle")
            .field("running", &self.is_running())
            .finish()
    }
}
