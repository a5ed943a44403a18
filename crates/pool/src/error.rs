//! Standalone error types for nebula-pool
//!
//! Almost nothing in the pool fails: an empty pool is `None`, contention is
//! served by the factory. What remains are programmer errors (bad sizing or
//! unit counts) and host setup failures.

use thiserror::Error;
use tracing::{error, warn};

/// Pool errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Segment sizing or other configuration that cannot produce a valid chain.
    #[error("Invalid pool configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Scheduler sized outside `1..=max`.
    #[error("Invalid unit count: {requested} (allowed 1..={max})")]
    InvalidUnitCount { requested: usize, max: usize },

    /// The background rotation thread could not be started.
    #[error("Failed to spawn collector thread: {reason}")]
    CollectorSpawn { reason: String },
}

impl PoolError {
    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "POOL:CONFIG:INVALID",
            Self::InvalidUnitCount { .. } => "POOL:SCHED:UNITS",
            Self::CollectorSpawn { .. } => "POOL:RUNTIME:SPAWN",
        }
    }

    /// Fatal errors indicate misuse; `PoolBuilder::build` panics with them
    /// instead of returning them.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. })
    }

    /// Create invalid config error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!(%reason, "rejected pool configuration");
        Self::InvalidConfig { reason }
    }

    /// Create invalid unit count error
    #[must_use]
    pub fn invalid_unit_count(requested: usize, max: usize) -> Self {
        Self::InvalidUnitCount { requested, max }
    }

    /// Create collector spawn error
    pub fn collector_spawn(err: &std::io::Error) -> Self {
        error!(error = %err, "failed to spawn pool collector");
        Self::CollectorSpawn {
            reason: err.to_string(),
        }
    }
}

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;
