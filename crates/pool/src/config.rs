//! Pool configuration
//!
//! The only knobs are cosmetic (a name for logs) and the ring segment sizing
//! used by every shard's chain. Sizing mistakes are programmer errors:
//! [`PoolConfig::validate`] reports them, and building a pool from an invalid
//! configuration panics.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::core::limits::{DEFAULT_INITIAL_SEGMENT, SEGMENT_LIMIT};
use crate::error::{PoolError, PoolResult};

/// Configuration for [`Pool`](crate::Pool)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Name attached to log events for this pool
    pub name: Option<String>,

    /// Capacity of the first ring segment in each shard's chain (power of two)
    pub initial_segment_capacity: usize,

    /// Cap for segment doubling (power of two, at most `2^30`)
    pub max_segment_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: None,
            initial_segment_capacity: DEFAULT_INITIAL_SEGMENT,
            max_segment_capacity: SEGMENT_LIMIT,
        }
    }
}

impl PoolConfig {
    /// Create a configuration with a pool name
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Larger first segments: fewer chain links when many objects are parked
    /// at once
    #[must_use]
    pub fn for_bursty_load() -> Self {
        Self::default().with_initial_segment_capacity(64)
    }

    /// Small segments that stop doubling early
    #[must_use]
    pub fn for_low_memory() -> Self {
        Self::default()
            .with_initial_segment_capacity(4)
            .with_max_segment_capacity(1024)
    }

    /// Set the pool name
    #[must_use = "builder methods must be chained or built"]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the first segment capacity
    #[must_use = "builder methods must be chained or built"]
    pub fn with_initial_segment_capacity(mut self, capacity: usize) -> Self {
        self.initial_segment_capacity = capacity;
        self
    }

    /// Set the segment growth cap
    #[must_use = "builder methods must be chained or built"]
    pub fn with_max_segment_capacity(mut self, capacity: usize) -> Self {
        self.max_segment_capacity = capacity;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> PoolResult<()> {
        let initial = self.initial_segment_capacity;
        let max = self.max_segment_capacity;

        if initial == 0 || !initial.is_power_of_two() {
            return Err(PoolError::invalid_config(format!(
                "initial segment capacity {initial} must be a non-zero power of two"
            )));
        }

        if max == 0 || !max.is_power_of_two() {
            return Err(PoolError::invalid_config(format!(
                "max segment capacity {max} must be a non-zero power of two"
            )));
        }

        if max > SEGMENT_LIMIT {
            return Err(PoolError::invalid_config(format!(
                "max segment capacity {max} exceeds limit {SEGMENT_LIMIT}"
            )));
        }

        if initial > max {
            return Err(PoolError::invalid_config(format!(
                "initial segment capacity {initial} exceeds max {max}"
            )));
        }

        Ok(())
    }

    pub(crate) fn sizing(&self) -> SegmentSizing {
        SegmentSizing {
            initial: self.initial_segment_capacity,
            max: self.max_segment_capacity,
        }
    }
}

/// Validated segment sizing copied into every chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SegmentSizing {
    pub(crate) initial: usize,
    pub(crate) max: usize,
}

impl SegmentSizing {
    /// Capacity of the segment that follows a full one of `current` slots.
    pub(crate) fn grow(self, current: usize) -> usize {
        current.saturating_mul(2).min(self.max)
    }
}

impl Default for SegmentSizing {
    fn default() -> Self {
        PoolConfig::default().sizing()
    }
}
