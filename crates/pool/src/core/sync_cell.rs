//! Interior mutability for state owned by a pinned execution unit.
//!
//! A shard's private slot and its chain head are written without atomics:
//! the pinning protocol guarantees that only the unit pinned to that shard
//! touches them. `SyncUnsafeCell` lets those fields live inside a shared
//! (`Sync`) shard table while leaving the exclusivity argument to the caller.

use core::cell::UnsafeCell;

/// A wrapper around `UnsafeCell<T>` that implements `Sync`.
///
/// # Safety
///
/// Every access through [`SyncUnsafeCell::get`] must be performed by the
/// execution unit currently pinned to the owning shard.
#[repr(transparent)]
pub(crate) struct SyncUnsafeCell<T: ?Sized>(UnsafeCell<T>);

// SAFETY: Values only move in and out of the cell (never shared by
// reference across units), and access is serialized by pinning, so `T: Send`
// is sufficient.
unsafe impl<T: ?Sized + Send> Sync for SyncUnsafeCell<T> {}

impl<T> SyncUnsafeCell<T> {
    #[inline]
    pub(crate) const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }
}

impl<T: ?Sized> SyncUnsafeCell<T> {
    /// Gets a mutable pointer to the wrapped value.
    #[inline]
    pub(crate) fn get(&self) -> *mut T {
        self.0.get()
    }

    /// Exclusive access when the cell itself is uniquely borrowed.
    #[inline]
    pub(crate) fn get_mut(&mut self) -> &mut T {
        self.0.get_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_slot_roundtrip() {
        let cell = SyncUnsafeCell::new(None::<String>);
        // SAFETY: single-threaded test, no other access.
        unsafe {
            *cell.get() = Some("hello".to_string());
            assert_eq!((*cell.get()).take().as_deref(), Some("hello"));
            assert!((*cell.get()).is_none());
        }
    }

    #[test]
    fn test_get_mut_without_unsafe() {
        let mut cell = SyncUnsafeCell::new(1_u32);
        *cell.get_mut() += 1;
        assert_eq!(*cell.get_mut(), 2);
    }

    #[test]
    fn test_send_sync_bounds() {
        fn assert_sync<T: Sync>() {}

        assert_sync::<SyncUnsafeCell<Option<Vec<u8>>>>();
    }
}
