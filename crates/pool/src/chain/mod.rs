//! Growable single-producer, multi-consumer deque.
//!
//! A [`Chain`] is a doubly-linked list of [`Ring`] segments. The owner pushes
//! to the head segment and allocates a segment twice as large when it fills
//! up. Stealers pop from the tail segment and unlink it once it is drained
//! and a newer segment exists.
//!
//! Segments are reference counted. A stealer that loaded a segment keeps it
//! alive until it returns, so unlinking never frees memory another thread is
//! still reading.

pub(crate) mod ring;

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::config::SegmentSizing;
use crate::core::SyncUnsafeCell;

use self::ring::Ring;

struct Segment<T> {
    ring: Ring<T>,
    /// Newer segment (towards the head). Written once by the owner.
    next: ArcSwapOption<Segment<T>>,
    /// Older segment (towards the tail). Cleared when the tail moves past it.
    prev: ArcSwapOption<Segment<T>>,
}

impl<T> Segment<T> {
    fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            ring: Ring::new(capacity),
            next: ArcSwapOption::empty(),
            prev: ArcSwapOption::empty(),
        })
    }
}

/// Owner end at the head, stealable end at the tail
pub(crate) struct Chain<T> {
    head: SyncUnsafeCell<Option<Arc<Segment<T>>>>,
    tail: ArcSwapOption<Segment<T>>,
    sizing: SegmentSizing,
}

impl<T: Send> Chain<T> {
    pub(crate) fn new(sizing: SegmentSizing) -> Self {
        Self {
            head: SyncUnsafeCell::new(None),
            tail: ArcSwapOption::empty(),
            sizing,
        }
    }

    /// Push a value at the head, growing the chain if the head segment is full.
    ///
    /// # Safety
    ///
    /// Caller must be the chain's owner: no other thread may run `push_head`
    /// or `pop_head` on this chain at the same time.
    pub(crate) unsafe fn push_head(&self, value: T) {
        // SAFETY: owner-only access to `head` per the caller contract.
        let head = unsafe { &mut *self.head.get() };

        let current = match head {
            Some(segment) => segment,
            None => {
                let segment = Segment::new(self.sizing.initial);
                self.tail.store(Some(Arc::clone(&segment)));
                head.insert(segment)
            }
        };

        // SAFETY: owner contract forwarded.
        let value = match unsafe { current.ring.push_head(value) } {
            Ok(()) => return,
            Err(value) => value,
        };

        let next = Segment::new(self.sizing.grow(current.ring.capacity()));
        next.prev.store(Some(Arc::clone(current)));
        current.next.store(Some(Arc::clone(&next)));

        // SAFETY: fresh segment, only reachable by stealers through `next`
        // and empty, so the push cannot fail.
        let pushed = unsafe { next.ring.push_head(value) };
        debug_assert!(pushed.is_ok());
        *head = Some(next);
    }

    /// Pop the most recently pushed value.
    ///
    /// # Safety
    ///
    /// Same contract as [`Chain::push_head`].
    pub(crate) unsafe fn pop_head(&self) -> Option<T> {
        // SAFETY: owner-only access to `head` per the caller contract.
        let mut segment = unsafe { (*self.head.get()).clone() };

        while let Some(current) = segment {
            // SAFETY: owner contract forwarded.
            if let Some(value) = unsafe { current.ring.pop_head() } {
                return Some(value);
            }
            segment = current.prev.load_full();
        }

        None
    }

    /// Pop the oldest value. Any thread may call this.
    ///
    /// May return `None` while a concurrent pop is racing for the last item.
    pub(crate) fn pop_tail(&self) -> Option<T> {
        let mut segment = self.tail.load_full()?;

        loop {
            // Load `next` before popping: if the pop then fails and `next` was
            // already set, the owner has stopped pushing into `segment` and it
            // is permanently empty.
            let next = segment.next.load_full();

            if let Some(value) = segment.ring.pop_tail() {
                return Some(value);
            }

            let next = next?;

            let previous = self
                .tail
                .compare_and_swap(&Some(Arc::clone(&segment)), Some(Arc::clone(&next)));
            if matches!(&*previous, Some(seen) if Arc::ptr_eq(seen, &segment)) {
                // Let the drained segment go once in-flight readers finish.
                next.prev.store(None);
            }

            segment = next;
        }
    }
}

impl<T> Drop for Chain<T> {
    fn drop(&mut self) {
        // Segments link both ways; walk from the tail breaking links so the
        // list is released iteratively instead of leaking as a cycle.
        drop(self.head.get_mut().take());

        let mut segment = self.tail.swap(None);
        while let Some(current) = segment {
            current.prev.store(None);
            segment = current.next.swap(None);
        }
    }
}
