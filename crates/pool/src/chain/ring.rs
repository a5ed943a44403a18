//! Fixed-capacity single-producer, multi-consumer ring.
//!
//! The owner pushes and pops at the head; any thread may pop at the tail.
//! Head and tail indices share one `AtomicU64` (head in the high 32 bits,
//! tail in the low 32 bits) so that a single CAS decides which consumer wins
//! the last element.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::core::limits::SEGMENT_LIMIT;

const HEAD_SHIFT: u32 = 32;

#[inline]
fn unpack(head_tail: u64) -> (u32, u32) {
    ((head_tail >> HEAD_SHIFT) as u32, head_tail as u32)
}

#[inline]
fn pack(head: u32, tail: u32) -> u64 {
    (u64::from(head) << HEAD_SHIFT) | u64::from(tail)
}

struct Slot<T> {
    /// Set by the producer after writing, cleared by whichever consumer read
    /// the value. The producer may not reuse a slot until it observes `false`.
    occupied: AtomicBool,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    fn vacant() -> Self {
        Self {
            occupied: AtomicBool::new(false),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

/// Lock-free ring buffer used as one segment of a [`Chain`](super::Chain)
pub(crate) struct Ring<T> {
    head_tail: AtomicU64,
    slots: Box<[Slot<T>]>,
    mask: usize,
}

// SAFETY: values are moved in by the owner and moved out by exactly one
// consumer (the CAS winner), never shared by reference.
unsafe impl<T: Send> Send for Ring<T> {}
// SAFETY: see above; slot access is arbitrated by `head_tail` and `occupied`.
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
    /// Create a ring with `capacity` slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero, not a power of two, or above `2^30`.
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two() && capacity <= SEGMENT_LIMIT,
            "ring capacity {capacity} must be a power of two in 1..={SEGMENT_LIMIT}"
        );

        Self {
            head_tail: AtomicU64::new(0),
            slots: (0..capacity).map(|_| Slot::vacant()).collect(),
            mask: capacity - 1,
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn slot(&self, index: u32) -> &Slot<T> {
        &self.slots[index as usize & self.mask]
    }

    /// Push at the head. Returns the value back if the ring is full or the
    /// target slot is still being vacated by a tail consumer.
    ///
    /// # Safety
    ///
    /// Only the ring's owner may call `push_head` and `pop_head`, and never
    /// concurrently with each other.
    pub(crate) unsafe fn push_head(&self, value: T) -> Result<(), T> {
        let (head, tail) = unpack(self.head_tail.load(Ordering::Acquire));
        if tail.wrapping_add(self.capacity() as u32) == head {
            return Err(value);
        }

        let slot = self.slot(head);
        if slot.occupied.load(Ordering::Acquire) {
            return Err(value);
        }

        // SAFETY: the slot is outside [tail, head) and no consumer holds it
        // (`occupied` is false), so the owner has exclusive access.
        unsafe { (*slot.value.get()).write(value) };
        slot.occupied.store(true, Ordering::Relaxed);

        // Publishes the write above to whoever claims this index.
        self.head_tail
            .fetch_add(1 << HEAD_SHIFT, Ordering::Release);
        Ok(())
    }

    /// Pop the most recently pushed value.
    ///
    /// # Safety
    ///
    /// Same contract as [`Ring::push_head`].
    pub(crate) unsafe fn pop_head(&self) -> Option<T> {
        let mut current = self.head_tail.load(Ordering::Acquire);
        let index = loop {
            let (head, tail) = unpack(current);
            if head == tail {
                return None;
            }

            let head = head.wrapping_sub(1);
            match self.head_tail.compare_exchange_weak(
                current,
                pack(head, tail),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break head,
                Err(actual) => current = actual,
            }
        };

        // SAFETY: the CAS claimed `index` for this caller alone.
        Some(unsafe { self.take(index) })
    }

    /// Pop the oldest value. Safe to call from any thread.
    pub(crate) fn pop_tail(&self) -> Option<T> {
        let mut current = self.head_tail.load(Ordering::Acquire);
        let index = loop {
            let (head, tail) = unpack(current);
            if head == tail {
                return None;
            }

            match self.head_tail.compare_exchange_weak(
                current,
                pack(head, tail.wrapping_add(1)),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break tail,
                Err(actual) => current = actual,
            }
        };

        // SAFETY: the CAS claimed `index` for this caller alone.
        Some(unsafe { self.take(index) })
    }

    /// # Safety
    ///
    /// `index` must have been claimed by a successful CAS on `head_tail`.
    unsafe fn take(&self, index: u32) -> T {
        let slot = self.slot(index);
        // SAFETY: claimed slots are always occupied and read exactly once.
        let value = unsafe { (*slot.value.get()).assume_init_read() };
        slot.occupied.store(false, Ordering::Release);
        value
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        for slot in &mut self.slots[..] {
            if *slot.occupied.get_mut() {
                // SAFETY: exclusive access; occupied slots hold an initialized value.
                unsafe { slot.value.get_mut().assume_init_drop() };
            }
        }
    }
}
