//! Building blocks shared by the chain, shard and pool layers.

pub(crate) mod limits;
pub(crate) mod sync_cell;

pub(crate) use sync_cell::SyncUnsafeCell;
