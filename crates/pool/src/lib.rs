//! # nebula-pool
//!
//! Sharded, generation-evicted object pool for short-lived values in the
//! Nebula workflow automation ecosystem.
//!
//! A [`Pool`] amortizes allocation of values that are created and discarded
//! at high rates (buffers, scratch maps, encoder state). It is a cache, not
//! a free list: cached values may disappear at any rotation.
//!
//! - Per-unit shards: `put`/`get` normally touch only the caller's shard.
//! - Work stealing: an empty shard steals from the others before missing.
//! - Two generations: [`Runtime::rotate`] demotes the current generation to
//!   victim and drops the previous victim.
//!
//! ## Quick Start
//!
//! ```rust
//! use nebula_pool::prelude::*;
//!
//! let pool = Pool::with_factory(String::new);
//!
//! {
//!     let mut line = pool.checkout().unwrap();
//!     line.push_str("scratch");
//! } // cleared and returned to the pool here
//!
//! // Cached values age out over two rotations.
//! Runtime::global().rotate();
//! Runtime::global().rotate();
//! ```
//!
//! ## Features
//!
//! - `stats`: per-pool hit/miss/steal counters via `Pool::stats`
//! - `serde`: `Serialize`/`Deserialize` for [`PoolConfig`]
//!
//! ## Architecture
//!
//! - Standalone error handling via the [`error`] module
//! - Structured logging via `tracing` (allocation and rotation only; the
//!   `get`/`put` paths never log)
//! - Execution units come from a [`Scheduler`]; [`UnitScheduler`] is the
//!   in-process default

#![cfg_attr(docsrs, feature(doc_cfg))]
// Pinning and the segment rings are built on raw slot access.
#![allow(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod pool;
pub mod registry;
pub mod runtime;
pub mod sched;

mod chain;
mod core;
mod shard;

pub use crate::config::PoolConfig;
pub use crate::error::{PoolError, PoolResult};
#[cfg(feature = "stats")]
#[cfg_attr(docsrs, doc(cfg(feature = "stats")))]
pub use crate::pool::{PoolStats, PoolStatsSnapshot};
pub use crate::pool::{Pool, PoolBuilder, PoolId, Poolable, Pooled};
pub use crate::registry::Registry;
pub use crate::runtime::{CollectorHandle, RotationReport, Runtime};
pub use crate::sched::{Scheduler, UnitScheduler};

pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::config::PoolConfig;
    pub use crate::error::{PoolError, PoolResult};
    pub use crate::pool::{Pool, PoolBuilder, Poolable, Pooled};
    pub use crate::runtime::Runtime;
    pub use crate::sched::{Scheduler, UnitScheduler};
}

use tracing::{debug, info};

/// Initialize the global pool runtime.
///
/// Optional: the runtime is created lazily on first use. Calling this at
/// startup moves the scheduler setup out of the first `get`.
///
/// # Examples
///
/// ```rust
/// fn main() -> nebula_pool::PoolResult<()> {
///     nebula_pool::init()?;
///
///     // Your application code here
///
///     nebula_pool::shutdown()
/// }
/// ```
pub fn init() -> PoolResult<()> {
    debug!("initializing nebula-pool runtime");

    let runtime = Runtime::global();

    info!(
        units = runtime.scheduler().unit_count(),
        "nebula-pool runtime initialized"
    );
    Ok(())
}

/// Evict every value cached in the global runtime.
///
/// Two rotations empty both generations; pools left with nothing drop out
/// of the registry on their own. Pools remain usable afterwards and start
/// from empty generations.
pub fn shutdown() -> PoolResult<()> {
    debug!("shutting down nebula-pool runtime");

    let runtime = Runtime::global();
    runtime.rotate();
    let report = runtime.rotate();

    info!(
        generation = report.generation,
        pools = report.pools,
        still_registered = runtime.registry().len(),
        "nebula-pool runtime shut down"
    );
    Ok(())
}
