//! Reset-on-return objects and the checkout guard

use std::collections::{HashMap, VecDeque};
use std::hash::BuildHasher;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};

use super::Pool;

/// Trait for objects that can be recycled through a [`Pool`]
///
/// # Example
/// ```
/// use nebula_pool::Poolable;
///
/// struct Frame {
///     seq: u64,
///     payload: Vec<u8>,
/// }
///
/// impl Poolable for Frame {
///     fn reset(&mut self) {
///         self.seq = 0;
///         self.payload.clear();
///     }
///
///     fn is_reusable(&self) -> bool {
///         self.payload.capacity() <= 64 * 1024
///     }
/// }
/// ```
pub trait Poolable: Send + 'static {
    /// Clear state that must not leak to the next user.
    fn reset(&mut self);

    /// Return false to drop the object instead of caching it.
    ///
    /// Checked before `reset`, so it sees the object as its last user left it.
    fn is_reusable(&self) -> bool {
        true
    }
}

impl Poolable for String {
    fn reset(&mut self) {
        self.clear();
    }

    fn is_reusable(&self) -> bool {
        // Don't pool strings with huge capacity
        self.capacity() < 1_000_000
    }
}

impl<T: Send + 'static> Poolable for Vec<T> {
    fn reset(&mut self) {
        self.clear();
    }

    fn is_reusable(&self) -> bool {
        self.capacity().saturating_mul(size_of::<T>().max(1)) < 10_000_000
    }
}

impl<T: Send + 'static> Poolable for VecDeque<T> {
    fn reset(&mut self) {
        self.clear();
    }

    fn is_reusable(&self) -> bool {
        self.capacity().saturating_mul(size_of::<T>().max(1)) < 10_000_000
    }
}

impl<K, V, S> Poolable for HashMap<K, V, S>
where
    K: Send + 'static,
    V: Send + 'static,
    S: BuildHasher + Send + 'static,
{
    fn reset(&mut self) {
        self.clear();
    }

    fn is_reusable(&self) -> bool {
        self.capacity() < 10_000
    }
}

impl<T: Poolable> Pool<T> {
    /// Get a value wrapped in a guard that recycles it on drop.
    ///
    /// Returns `None` when the pool is empty and has no factory.
    pub fn checkout(&self) -> Option<Pooled<'_, T>> {
        self.get().map(|value| Pooled {
            value: ManuallyDrop::new(value),
            pool: self,
        })
    }

    /// Reset `value` and put it back, unless it reports itself unusable.
    pub fn recycle(&self, mut value: T) {
        if value.is_reusable() {
            value.reset();
            self.put(value);
        }
    }
}

/// RAII wrapper returned by [`Pool::checkout`]
pub struct Pooled<'a, T: Poolable> {
    value: ManuallyDrop<T>,
    pool: &'a Pool<T>,
}

impl<'a, T: Poolable> Pooled<'a, T> {
    /// Keep the value; it will not be returned to the pool.
    pub fn detach(self) -> T {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so `value` is taken exactly once.
        unsafe { ManuallyDrop::take(&mut this.value) }
    }

    /// Pool the value will be returned to
    pub fn pool(&self) -> &'a Pool<T> {
        self.pool
    }
}

impl<T: Poolable> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T: Poolable> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.value
    }
}

impl<T: Poolable> AsRef<T> for Pooled<'_, T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

impl<T: Poolable> AsMut<T> for Pooled<'_, T> {
    fn as_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: Poolable> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        // SAFETY: `value` is initialized until taken here or in `detach`,
        // and `detach` suppresses this drop.
        let value = unsafe { ManuallyDrop::take(&mut self.value) };
        self.pool.recycle(value);
    }
}

impl<T: Poolable + std::fmt::Debug> std::fmt::Debug for Pooled<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pooled")
            .field("value", &*self.value)
            .field("pool", &self.pool.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::runtime::Runtime;
    use crate::sched::UnitScheduler;

    fn isolated() -> Pool<String> {
        UnitScheduler::set_thread_unit(0);
        Pool::builder()
            .runtime(Runtime::new(UnitScheduler::new(1)))
            .factory(String::new)
            .build()
    }

    #[test]
    fn test_string_poolable() {
        let mut s = String::from("hello world");
        assert!(s.is_reusable());

        s.reset();
        assert_eq!(s, "");
        assert!(s.capacity() > 0);
    }

    #[test]
    fn test_large_vec_not_reusable() {
        let mut v = Vec::with_capacity(10_000_001);
        v.push(1u8);
        assert!(!v.is_reusable());

        let mut small = VecDeque::from(vec![1, 2, 3]);
        small.reset();
        assert!(small.is_empty());
    }

    #[test]
    fn test_checkout_returns_reset_value() {
        let pool = isolated();
        {
            let mut s = pool.checkout().unwrap();
            s.push_str("scratch");
            assert_eq!(s.as_str(), "scratch");
        }

        let s = pool.get().unwrap();
        assert!(s.is_empty());
        assert!(s.capacity() >= "scratch".len());
    }

    #[test]
    fn test_detach_keeps_value() {
        let pool = isolated();
        let mut guard = pool.checkout().unwrap();
        guard.push_str("kept");
        let s = guard.detach();
        assert_eq!(s, "kept");

        // Nothing was returned, so the factory builds a fresh one.
        assert_eq!(pool.get().unwrap().capacity(), 0);
    }

    #[test]
    fn test_recycle_drops_unusable() {
        let pool: Pool<Vec<u8>> = Pool::builder()
            .runtime(Runtime::new(Arc::new(UnitScheduler::new(1))))
            .build();

        pool.recycle(Vec::with_capacity(20_000_000));
        assert!(pool.get().is_none());

        pool.recycle(vec![1, 2, 3]);
        assert_eq!(pool.get(), Some(Vec::new()));
    }
}
