//! Sharded temporary object pool
//!
//! A [`Pool`] caches values that are expensive to allocate and cheap to
//! reuse. Each execution unit owns one shard of the current generation:
//! `put` and `get` touch only that shard unless it runs dry, in which case
//! `get` steals from other shards and then from the previous (victim)
//! generation before falling back to the factory.
//!
//! Cached values are not durable. Every [`Runtime::rotate`] demotes the
//! current generation to victim and drops the old victim, so a value that
//! sits unused across two rotations is gone.
//!
//! [`Runtime::rotate`]: crate::Runtime::rotate

mod poolable;
#[cfg(feature = "stats")]
mod stats;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use tracing::{debug, trace};

pub use poolable::{Poolable, Pooled};
#[cfg(feature = "stats")]
pub use stats::{PoolStats, PoolStatsSnapshot};

use crate::config::{PoolConfig, SegmentSizing};
use crate::error::PoolResult;
use crate::registry::{Retired, Rotate, Rotation};
use crate::runtime::Runtime;
use crate::sched::Pinned;
use crate::shard::{Shard, ShardTable};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Unique pool identity, used as the registry key and in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolId(u64);

impl PoolId {
    fn next() -> Self {
        Self(NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool-{}", self.0)
    }
}

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

/// Concurrent cache of reusable values
///
/// Cloning a `Pool` yields another handle to the same cache. The shared
/// state is private and only reachable through that `Arc`, so a pool cannot
/// be duplicated field by field once in use.
///
/// # Example
/// ```
/// use nebula_pool::Pool;
///
/// let pool = Pool::with_factory(|| Vec::<u8>::with_capacity(4096));
///
/// let mut buf = pool.get().unwrap_or_default();
/// buf.extend_from_slice(b"payload");
/// buf.clear();
/// pool.put(buf);
/// ```
pub struct Pool<T: Send + 'static> {
    inner: Arc<PoolInner<T>>,
}

struct PoolInner<T: Send + 'static> {
    id: PoolId,
    runtime: Arc<Runtime>,
    local: ArcSwap<ShardTable<T>>,
    victim: ArcSwap<ShardTable<T>>,
    /// Shared zero-length table installed whenever a generation is cleared
    empty: Arc<ShardTable<T>>,
    factory: Option<Factory<T>>,
    config: PoolConfig,
    sizing: SegmentSizing,
    #[cfg(feature = "stats")]
    stats: PoolStats,
}

/// A pinned unit together with the current table it indexes into.
///
/// Fields drop in order: the unit is released before any table reference
/// goes away, so a table freed here never runs item destructors while pinned.
struct PinnedShard<'a, T: Send> {
    pinned: Pinned<'a>,
    table: Arc<ShardTable<T>>,
    retired: Vec<Arc<ShardTable<T>>>,
}

impl<T: Send> PinnedShard<'_, T> {
    #[inline]
    fn unit(&self) -> usize {
        self.pinned.unit()
    }

    #[inline]
    fn local(&self) -> &Shard<T> {
        &self.table[self.unit()]
    }
}

impl<T: Send + 'static> Pool<T> {
    /// Pool on the global runtime without a factory
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Pool on the global runtime that calls `factory` on a miss
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::builder().factory(factory).build()
    }

    pub fn builder() -> PoolBuilder<T> {
        PoolBuilder::new()
    }

    pub fn id(&self) -> PoolId {
        self.inner.id
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.config.name.as_deref()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.inner.runtime
    }

    pub fn has_factory(&self) -> bool {
        self.inner.factory.is_some()
    }

    #[cfg(feature = "stats")]
    pub fn stats(&self) -> PoolStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Add `value` to the pool.
    ///
    /// If no execution unit is free (every unit busy, or a rotation in
    /// progress) the value is dropped instead of cached.
    pub fn put(&self, value: T) {
        #[cfg(feature = "stats")]
        self.inner.stats.record_put();

        let Some(pinned) = self.pin() else {
            #[cfg(feature = "stats")]
            self.inner.stats.record_bypass();
            drop(value);
            return;
        };
        // SAFETY: `pinned` holds the unit that owns this shard.
        unsafe { pinned.local().put(value) };
    }

    /// Take an arbitrary cached value, or build one with the factory.
    ///
    /// Returns `None` only when nothing is cached and there is no factory.
    /// Callers must not assume any relation between a value passed to `put`
    /// and the value returned here. If no execution unit is free the cache
    /// is skipped and the factory decides the result.
    pub fn get(&self) -> Option<T> {
        #[cfg(feature = "stats")]
        self.inner.stats.record_get();

        let cached = match self.pin() {
            Some(mut pinned) => {
                // SAFETY: `pinned` holds the unit that owns this shard.
                match unsafe { pinned.local().get_local() } {
                    Some(value) => {
                        #[cfg(feature = "stats")]
                        self.inner.stats.record_local_hit();
                        Some(value)
                    }
                    None => self.get_slow(&mut pinned),
                }
            }
            None => {
                #[cfg(feature = "stats")]
                self.inner.stats.record_bypass();
                None
            }
        };

        cached.or_else(|| self.make())
    }

    fn get_slow(&self, pinned: &mut PinnedShard<'_, T>) -> Option<T> {
        let unit = pinned.unit();

        let table = &pinned.table;
        let len = table.len();
        for offset in 1..len {
            if let Some(value) = table[(unit + offset) % len].steal() {
                #[cfg(feature = "stats")]
                self.inner.stats.record_steal();
                return Some(value);
            }
        }

        let victim = self.inner.victim.load_full();
        // Keeps the table alive until after unpin if it is swapped out meanwhile.
        pinned.retired.push(Arc::clone(&victim));
        let len = victim.len();
        if unit >= len {
            return None;
        }

        // SAFETY: victim shards are indexed by unit like the current table,
        // and only the unit pinned to `unit` reads its private slot.
        if let Some(value) = unsafe { victim[unit].take_private() } {
            #[cfg(feature = "stats")]
            self.inner.stats.record_victim_hit();
            return Some(value);
        }

        for offset in 0..len {
            if let Some(value) = victim[(unit + offset) % len].steal() {
                #[cfg(feature = "stats")]
                self.inner.stats.record_victim_hit();
                return Some(value);
            }
        }

        // Nothing left to scavenge: later gets skip the victim entirely.
        let previous = self
            .inner
            .victim
            .compare_and_swap(&victim, Arc::clone(&self.inner.empty));
        if Arc::ptr_eq(&previous, &victim) {
            #[cfg(feature = "stats")]
            self.inner.stats.record_victim_dropped();
            trace!(pool = %self.inner.id, shards = len, "victim generation drained");
        }

        None
    }

    fn make(&self) -> Option<T> {
        #[cfg(feature = "stats")]
        self.inner.stats.record_miss();

        let factory = self.inner.factory.as_ref()?;
        #[cfg(feature = "stats")]
        self.inner.stats.record_factory_call();
        Some(factory())
    }

    /// Pin a unit and load the table it indexes into. `None` when no unit
    /// is free.
    #[inline]
    fn pin(&self) -> Option<PinnedShard<'_, T>> {
        let pinned = Pinned::try_new(self.inner.runtime.scheduler())?;
        let table = self.inner.local.load_full();
        if pinned.unit() < table.len() {
            return Some(PinnedShard {
                pinned,
                table,
                retired: Vec::new(),
            });
        }

        drop(pinned);
        drop(table);
        self.pin_slow()
    }

    /// Allocate (or grow) the current table under the registry lock.
    #[cold]
    fn pin_slow(&self) -> Option<PinnedShard<'_, T>> {
        let inner = &*self.inner;
        let scheduler = inner.runtime.scheduler();

        // Lock before pinning: rotation takes the lock and then stops the world.
        let mut registry = inner.runtime.registry().lock();
        let pinned = Pinned::try_new(scheduler)?;
        let unit = pinned.unit();

        let current = inner.local.load_full();
        if unit < current.len() {
            drop(registry);
            return Some(PinnedShard {
                pinned,
                table: current,
                retired: Vec::new(),
            });
        }

        // `local` still holds this table until the swap below.
        drop(current);

        let weak: Weak<dyn Rotate> = Arc::downgrade(&self.inner) as Weak<dyn Rotate>;
        registry.register(inner.id, weak);

        let units = scheduler.unit_count().max(unit + 1);
        let table = Arc::new(ShardTable::new(units, inner.sizing));
        let replaced = inner.local.swap(Arc::clone(&table));
        drop(registry);

        #[cfg(feature = "stats")]
        inner.stats.record_table_allocated();
        debug!(
            pool = %inner.id,
            name = inner.config.name.as_deref().unwrap_or(""),
            units,
            replaced = replaced.len(),
            "allocated shard table"
        );

        Some(PinnedShard {
            pinned,
            table,
            retired: vec![replaced],
        })
    }
}

impl<T: Send + 'static> Rotate for PoolInner<T> {
    fn rotate(&self) -> Rotation {
        let previous = self.local.swap(Arc::clone(&self.empty));
        let holds_victim = !previous.is_empty();
        let evicted = self.victim.swap(previous);

        Rotation {
            retired: (!evicted.is_empty()).then(|| Box::new(evicted) as Retired),
            holds_victim,
        }
    }
}

impl<T: Send + 'static> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.inner.id)
            .field("name", &self.inner.config.name)
            .field("shards", &self.inner.local.load().len())
            .field("victim_shards", &self.inner.victim.load().len())
            .field("has_factory", &self.has_factory())
            .finish()
    }
}

/// Builder for [`Pool`]
pub struct PoolBuilder<T> {
    config: PoolConfig,
    runtime: Option<Arc<Runtime>>,
    factory: Option<Factory<T>>,
}

impl<T: Send + 'static> PoolBuilder<T> {
    pub fn new() -> Self {
        Self {
            config: PoolConfig::default(),
            runtime: None,
            factory: None,
        }
    }

    /// Set the pool name used in logs
    #[must_use = "builder methods must be chained or built"]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    /// Replace the whole configuration
    #[must_use = "builder methods must be chained or built"]
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach the pool to `runtime` instead of the global one
    #[must_use = "builder methods must be chained or built"]
    pub fn runtime(mut self, runtime: Arc<Runtime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build values with `factory` when the pool is empty
    #[must_use = "builder methods must be chained or built"]
    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.factory = Some(Box::new(factory));
        self
    }

    /// Build the pool, validating the configuration
    pub fn try_build(self) -> PoolResult<Pool<T>> {
        self.config.validate()?;

        let empty = Arc::new(ShardTable::empty());
        Ok(Pool {
            inner: Arc::new(PoolInner {
                id: PoolId::next(),
                runtime: self
                    .runtime
                    .unwrap_or_else(|| Arc::clone(Runtime::global())),
                local: ArcSwap::new(Arc::clone(&empty)),
                victim: ArcSwap::new(Arc::clone(&empty)),
                empty,
                factory: self.factory,
                sizing: self.config.sizing(),
                config: self.config,
                #[cfg(feature = "stats")]
                stats: PoolStats::default(),
            }),
        })
    }

    /// Build the pool.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid; use
    /// [`try_build`](PoolBuilder::try_build) to handle that case.
    pub fn build(self) -> Pool<T> {
        match self.try_build() {
            Ok(pool) => pool,
            Err(err) => panic!("{err}"),
        }
    }
}

impl<T: Send + 'static> Default for PoolBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for PoolBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolBuilder")
            .field("config", &self.config)
            .field("custom_runtime", &self.runtime.is_some())
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}
