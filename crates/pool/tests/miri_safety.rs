//! Miri safety tests for nebula-pool
//!
//! These tests exercise the unsafe slot handling (private slots, ring
//! segments, checkout guards) under Miri with small workloads.
//! Run with: cargo +nightly miri test -p nebula-pool --test miri_safety

#![cfg(miri)]

use std::sync::Arc;
use std::thread;

use nebula_pool::{Pool, PoolConfig, Runtime, UnitScheduler};

fn small_pool<T: Send + 'static>(units: usize) -> Pool<T> {
    Pool::builder()
        .runtime(Runtime::new(UnitScheduler::new(units)))
        .config(
            PoolConfig::default()
                .with_initial_segment_capacity(2)
                .with_max_segment_capacity(4),
        )
        .build()
}

/// Values crossing segment boundaries are moved out exactly once
#[test]
fn miri_chain_growth_and_drain() {
    UnitScheduler::set_thread_unit(0);
    let pool = small_pool::<Box<u64>>(1);

    for value in 0..12 {
        pool.put(Box::new(value));
    }
    let mut drained: Vec<u64> = std::iter::from_fn(|| pool.get()).map(|b| *b).collect();
    drained.sort_unstable();
    assert_eq!(drained, (0..12).collect::<Vec<_>>());
}

/// Rotation drops boxed values without leaks or double frees
#[test]
fn miri_rotation_drops_values() {
    UnitScheduler::set_thread_unit(0);
    let pool = small_pool::<String>(2);

    pool.put("a".repeat(8));
    pool.put("b".repeat(8));
    pool.put("c".repeat(8));

    pool.runtime().rotate();
    assert!(pool.get().is_some());
    pool.runtime().rotate();
    assert!(pool.get().is_none());
}

/// Stealing across threads
#[test]
fn miri_steal_from_other_thread() {
    let pool = small_pool::<Box<usize>>(2);

    UnitScheduler::set_thread_unit(0);
    for value in 0..6 {
        pool.put(Box::new(value));
    }

    let stolen = thread::scope(|scope| {
        scope
            .spawn(|| {
                UnitScheduler::set_thread_unit(1);
                std::iter::from_fn(|| pool.get()).count()
            })
            .join()
            .unwrap()
    });

    // Everything but unit 0's private slot can be stolen.
    assert_eq!(stolen, 5);
    assert_eq!(pool.get().map(|b| *b), Some(0));
}

/// Detached and recycled checkouts
#[test]
fn miri_checkout_guard() {
    UnitScheduler::set_thread_unit(0);
    let pool = Pool::builder()
        .runtime(Runtime::new(Arc::new(UnitScheduler::new(1))))
        .factory(|| vec![0_u8; 16])
        .build();

    {
        let mut guard = pool.checkout().unwrap();
        guard.push(1);
    }
    let kept = pool.checkout().unwrap().detach();
    assert!(kept.is_empty());
    assert!(kept.capacity() >= 16);
}
