//! Pool registry
//!
//! Every pool that allocates a shard table registers a weak back-reference
//! here so that rotation can reach it. Entries leave only through rotation
//! (a pool holding no generation) or when the pool itself is dropped, so a
//! pool with cached values is always reachable. The registry mutex is the only lock in
//! the crate; it is taken on table allocation, rotation and diagnostics,
//! never on the `get`/`put` fast paths.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};
use tracing::trace;

use crate::pool::PoolId;

/// Tables removed from a pool during rotation, dropped once the world runs
/// again and the registry lock is released.
pub(crate) type Retired = Box<dyn Any + Send>;

/// Result of rotating a single pool.
pub(crate) struct Rotation {
    pub(crate) retired: Option<Retired>,
    /// The pool still holds a victim generation and must see the next
    /// rotation even if it allocates no new table.
    pub(crate) holds_victim: bool,
}

/// Generation shift, implemented by every pool.
pub(crate) trait Rotate: Send + Sync {
    /// Drop the victim, demote current to victim, reset current.
    ///
    /// Called only while the world is stopped.
    fn rotate(&self) -> Rotation;
}

/// Set of pools that own at least one generation
pub struct Registry {
    state: Mutex<RegistryState>,
}

pub(crate) struct RegistryState {
    pools: HashMap<PoolId, Weak<dyn Rotate>>,
}

impl RegistryState {
    /// Register a pool. Returns `false` if it was already present.
    pub(crate) fn register(&mut self, id: PoolId, pool: Weak<dyn Rotate>) -> bool {
        let inserted = self.pools.insert(id, pool).is_none();
        if inserted {
            trace!(pool = %id, "registered pool");
        }
        inserted
    }

    /// Upgrade every live entry, removing dead ones. Returns the live pools
    /// and the number pruned.
    pub(crate) fn collect_live(&mut self) -> (Vec<(PoolId, Arc<dyn Rotate>)>, usize) {
        let before = self.pools.len();
        let mut live = Vec::with_capacity(before);
        self.pools.retain(|id, pool| match pool.upgrade() {
            Some(pool) => {
                live.push((*id, pool));
                true
            }
            None => false,
        });
        (live, before - self.pools.len())
    }

    /// Keep only the given pools.
    pub(crate) fn retain_only(&mut self, keep: &[PoolId]) {
        self.pools.retain(|id, _| keep.contains(id));
    }
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                pools: HashMap::new(),
            }),
        }
    }

    /// Number of registered pools, including ones that have since been
    /// dropped but not yet pruned.
    pub fn len(&self) -> usize {
        self.state.lock().pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `id` is registered
    pub fn contains(&self, id: PoolId) -> bool {
        self.state.lock().pools.contains_key(&id)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("pools", &self.len())
            .finish()
    }
}
