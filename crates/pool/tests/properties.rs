//! Behavioral guarantees of `Pool` on isolated runtimes.
//!
//! Each test builds its own `Runtime` so rotations in one test never touch
//! another test's pools. Shard placement is controlled through
//! `UnitScheduler::set_thread_unit`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use nebula_pool::{Pool, PoolConfig, Runtime, Scheduler, UnitScheduler};

/// Value that counts its own drops.
#[derive(Debug)]
struct Tracked {
    id: usize,
    drops: Arc<AtomicUsize>,
}

impl Tracked {
    fn new(id: usize, drops: &Arc<AtomicUsize>) -> Self {
        Self {
            id,
            drops: Arc::clone(drops),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Value that records whether any unit was pinned when it was dropped.
struct PinWatcher {
    scheduler: Arc<UnitScheduler>,
    dropped: Arc<AtomicUsize>,
    dropped_while_pinned: Arc<AtomicBool>,
}

impl PinWatcher {
    fn new(
        scheduler: &Arc<UnitScheduler>,
        dropped: &Arc<AtomicUsize>,
        dropped_while_pinned: &Arc<AtomicBool>,
    ) -> Self {
        Self {
            scheduler: Arc::clone(scheduler),
            dropped: Arc::clone(dropped),
            dropped_while_pinned: Arc::clone(dropped_while_pinned),
        }
    }
}

impl Drop for PinWatcher {
    fn drop(&mut self) {
        if (0..self.scheduler.capacity()).any(|unit| self.scheduler.is_pinned(unit)) {
            self.dropped_while_pinned.store(true, Ordering::SeqCst);
        }
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

fn runtime(units: usize) -> (Arc<UnitScheduler>, Arc<Runtime>) {
    let scheduler = Arc::new(UnitScheduler::with_capacity(units, 8).unwrap());
    let runtime = Runtime::new(Arc::clone(&scheduler));
    (scheduler, runtime)
}

fn pool_on<T: Send + 'static>(runtime: &Arc<Runtime>) -> Pool<T> {
    Pool::builder().runtime(Arc::clone(runtime)).build()
}

#[test]
fn local_put_then_get_returns_same_value() {
    let (_scheduler, runtime) = runtime(4);
    UnitScheduler::set_thread_unit(1);
    let pool = pool_on(&runtime);

    pool.put("a");
    assert_eq!(pool.get(), Some("a"));
}

#[test]
fn local_chain_is_lifo_after_private_slot() {
    let (_scheduler, runtime) = runtime(1);
    UnitScheduler::set_thread_unit(0);
    let pool = pool_on(&runtime);

    for value in 1..=4 {
        pool.put(value);
    }

    let drained: Vec<_> = std::iter::from_fn(|| pool.get()).collect();
    assert_eq!(drained, vec![1, 4, 3, 2]);
}

#[test]
fn empty_pool_uses_factory() {
    let (_scheduler, runtime) = runtime(2);
    let pool = Pool::builder()
        .runtime(runtime)
        .factory(|| String::from("fresh"))
        .build();

    assert_eq!(pool.get().as_deref(), Some("fresh"));
}

#[test]
fn empty_pool_without_factory_is_none() {
    let (_scheduler, runtime) = runtime(2);
    let pool: Pool<u32> = pool_on(&runtime);

    assert_eq!(pool.get(), None);
}

#[test]
fn value_survives_one_rotation() {
    let (_scheduler, runtime) = runtime(2);
    UnitScheduler::set_thread_unit(0);
    let pool = pool_on(&runtime);

    pool.put(42);
    let report = runtime.rotate();
    assert_eq!(report.pools, 1);

    assert_eq!(pool.get(), Some(42));
}

#[test]
fn value_evicted_after_two_rotations() {
    let (_scheduler, runtime) = runtime(2);
    UnitScheduler::set_thread_unit(0);
    let drops = Arc::new(AtomicUsize::new(0));
    let pool = pool_on(&runtime);

    pool.put(Tracked::new(1, &drops));
    runtime.rotate();
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    let report = runtime.rotate();
    assert_eq!(report.evicted_tables, 1);
    assert_eq!(drops.load(Ordering::SeqCst), 1);

    assert!(pool.get().is_none());
}

#[test]
fn idle_pool_leaves_registry_after_eviction() {
    let (_scheduler, runtime) = runtime(1);
    UnitScheduler::set_thread_unit(0);
    let pool = pool_on(&runtime);

    pool.put(1_u8);
    assert!(runtime.registry().contains(pool.id()));

    // First rotation: the pool keeps a victim and stays registered.
    runtime.rotate();
    assert!(runtime.registry().contains(pool.id()));

    // Second rotation drops the victim; nothing left to rotate.
    runtime.rotate();
    assert!(!runtime.registry().contains(pool.id()));

    // Next use registers again.
    pool.put(2);
    assert!(runtime.registry().contains(pool.id()));
}

#[test]
fn value_put_right_after_eviction_is_still_evicted() {
    let (_scheduler, runtime) = runtime(1);
    UnitScheduler::set_thread_unit(0);
    let drops = Arc::new(AtomicUsize::new(0));
    let pool = pool_on(&runtime);

    pool.put(Tracked::new(1, &drops));
    runtime.rotate();
    runtime.rotate();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert!(!runtime.registry().contains(pool.id()));

    // Cached again before anyone else touches the runtime: the pool must be
    // reachable by the next rotations.
    pool.put(Tracked::new(2, &drops));
    assert!(runtime.registry().contains(pool.id()));

    runtime.rotate();
    runtime.rotate();
    assert_eq!(drops.load(Ordering::SeqCst), 2);
    assert!(pool.get().is_none());
}

#[test]
fn put_and_get_return_while_every_unit_is_held() {
    let (scheduler, runtime) = runtime(1);
    let drops = Arc::new(AtomicUsize::new(0));
    let pool = Pool::builder()
        .runtime(Arc::clone(&runtime))
        .factory({
            let drops = Arc::clone(&drops);
            move || Tracked::new(0, &drops)
        })
        .build();

    let held = scheduler.pin();

    let (done, finished) = mpsc::channel();
    let worker = {
        let pool = pool.clone();
        let drops = Arc::clone(&drops);
        thread::spawn(move || {
            // No unit is free: the value is dropped, not cached.
            pool.put(Tracked::new(1, &drops));
            let fresh = pool.get().unwrap();
            done.send(fresh.id).unwrap();
        })
    };

    let served = finished
        .recv_timeout(Duration::from_secs(5))
        .expect("get/put waited for a pinned unit");
    worker.join().unwrap();
    assert_eq!(served, 0);
    assert_eq!(drops.load(Ordering::SeqCst), 2);

    scheduler.unpin(held);

    UnitScheduler::set_thread_unit(0);
    pool.put(Tracked::new(3, &drops));
    assert_eq!(pool.get().unwrap().id, 3);
}

#[test]
fn drained_victim_drops_values_after_unpin() {
    let (scheduler, runtime) = runtime(2);
    let dropped = Arc::new(AtomicUsize::new(0));
    let dropped_while_pinned = Arc::new(AtomicBool::new(false));
    let pool = pool_on(&runtime);

    // Unit 1's private slot cannot be stolen, so it is still in the victim
    // when unit 0 finds nothing else and drops the victim generation.
    UnitScheduler::set_thread_unit(1);
    pool.put(PinWatcher::new(&scheduler, &dropped, &dropped_while_pinned));
    runtime.rotate();

    UnitScheduler::set_thread_unit(0);
    assert!(pool.get().is_none());
    assert_eq!(dropped.load(Ordering::SeqCst), 1);
    assert!(!dropped_while_pinned.load(Ordering::SeqCst));
}

#[test]
fn replaced_table_drops_values_after_unpin() {
    let (scheduler, runtime) = runtime(1);
    let dropped = Arc::new(AtomicUsize::new(0));
    let dropped_while_pinned = Arc::new(AtomicBool::new(false));
    let pool = pool_on(&runtime);

    UnitScheduler::set_thread_unit(0);
    pool.put(PinWatcher::new(&scheduler, &dropped, &dropped_while_pinned));

    scheduler.set_unit_count(2);
    UnitScheduler::set_thread_unit(1);
    assert!(pool.get().is_none());
    assert_eq!(dropped.load(Ordering::SeqCst), 1);
    assert!(!dropped_while_pinned.load(Ordering::SeqCst));
}

#[test]
fn steal_takes_shared_entry_once() {
    let (_scheduler, runtime) = runtime(2);
    let pool = pool_on(&runtime);

    UnitScheduler::set_thread_unit(0);
    pool.put("private");
    pool.put("shared");

    UnitScheduler::set_thread_unit(1);
    assert_eq!(pool.get(), Some("shared"));
    // The private slot of unit 0 is not stealable.
    assert_eq!(pool.get(), None);

    UnitScheduler::set_thread_unit(0);
    assert_eq!(pool.get(), Some("private"));
    assert_eq!(pool.get(), None);
}

#[test]
fn victim_is_scanned_from_other_units() {
    let (_scheduler, runtime) = runtime(2);
    let pool = pool_on(&runtime);

    UnitScheduler::set_thread_unit(0);
    pool.put(1);
    pool.put(2);
    runtime.rotate();

    // Unit 1 cannot take unit 0's private slot, only its chain.
    UnitScheduler::set_thread_unit(1);
    assert_eq!(pool.get(), Some(2));

    UnitScheduler::set_thread_unit(0);
    assert_eq!(pool.get(), Some(1));
}

#[test]
fn growing_unit_count_discards_old_table() {
    let (scheduler, runtime) = runtime(2);
    let drops = Arc::new(AtomicUsize::new(0));
    let pool = pool_on(&runtime);

    UnitScheduler::set_thread_unit(0);
    pool.put(Tracked::new(7, &drops));

    assert_eq!(scheduler.set_unit_count(4), 2);
    UnitScheduler::set_thread_unit(3);

    // Unit 3 is beyond the old table: a fresh table replaces it.
    assert!(pool.get().is_none());
    assert_eq!(drops.load(Ordering::SeqCst), 1);

    UnitScheduler::set_thread_unit(0);
    assert!(pool.get().is_none());

    pool.put(Tracked::new(8, &drops));
    let value = pool.get().unwrap();
    assert_eq!(value.id, 8);
    drop(value);
    assert_eq!(drops.load(Ordering::SeqCst), 2);
}

#[test]
fn dropped_pools_are_pruned() {
    let (_scheduler, runtime) = runtime(1);
    UnitScheduler::set_thread_unit(0);

    let pool = pool_on::<u8>(&runtime);
    pool.put(1);
    drop(pool);

    let report = runtime.rotate();
    assert_eq!(report.pools, 0);
    assert_eq!(report.pruned, 1);
    assert!(runtime.registry().is_empty());
}

#[test]
fn pools_on_one_runtime_rotate_together() {
    let (_scheduler, runtime) = runtime(1);
    UnitScheduler::set_thread_unit(0);

    let numbers = pool_on::<u32>(&runtime);
    let words = pool_on::<&str>(&runtime);
    numbers.put(1);
    words.put("one");

    assert_eq!(runtime.rotate().pools, 2);
    assert_eq!(runtime.rotate().evicted_tables, 2);
    assert!(numbers.get().is_none());
    assert!(words.get().is_none());
}

#[test]
fn small_segments_hold_many_values() {
    let (_scheduler, runtime) = runtime(1);
    UnitScheduler::set_thread_unit(0);
    let pool: Pool<usize> = Pool::builder()
        .runtime(runtime)
        .config(PoolConfig::for_low_memory())
        .build();

    for value in 0..5_000 {
        pool.put(value);
    }
    let mut drained: Vec<_> = std::iter::from_fn(|| pool.get()).collect();
    drained.sort_unstable();
    assert_eq!(drained, (0..5_000).collect::<Vec<_>>());
}

#[test]
fn global_shutdown_evicts_everything() {
    nebula_pool::init().unwrap();
    let pool = Pool::new();
    pool.put(String::from("cached"));

    nebula_pool::shutdown().unwrap();
    assert!(pool.get().is_none());

    // Shutdown does not disconnect pools from rotation.
    pool.put(String::from("after shutdown"));
    assert!(Runtime::global().registry().contains(pool.id()));
    nebula_pool::shutdown().unwrap();
    assert!(pool.get().is_none());
}

#[cfg(feature = "stats")]
#[test]
fn stats_track_each_source() {
    let (_scheduler, runtime) = runtime(2);
    let pool = Pool::builder().runtime(Arc::clone(&runtime)).factory(|| 0_u32).build();

    UnitScheduler::set_thread_unit(0);
    pool.put(1);
    pool.put(2);
    assert_eq!(pool.get(), Some(1)); // local

    UnitScheduler::set_thread_unit(1);
    assert_eq!(pool.get(), Some(2)); // steal
    assert_eq!(pool.get(), Some(0)); // factory

    let stats = pool.stats();
    assert_eq!(stats.gets, 3);
    assert_eq!(stats.puts, 2);
    assert_eq!(stats.local_hits, 1);
    assert_eq!(stats.steals, 1);
    assert_eq!(stats.factory_calls, 1);
    assert_eq!(stats.tables_allocated, 1);
}
