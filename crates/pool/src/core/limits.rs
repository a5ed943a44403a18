//! Sizing constants

/// Largest ring segment a chain will allocate.
///
/// Head and tail are packed as two 32-bit halves of one atomic word, so a ring
/// must stay well below `2^32` slots for the full check to be unambiguous.
pub(crate) const SEGMENT_LIMIT: usize = 1 << 30;

/// Capacity of the first ring segment in a chain.
pub(crate) const DEFAULT_INITIAL_SEGMENT: usize = 8;

/// Upper bound on the number of execution units a `UnitScheduler` can host.
pub(crate) const MAX_UNITS: usize = 256;
