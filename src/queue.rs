//! SRMW lock-free bounded event queue.
//!
//! Allocator threads push [`crate::events::Event`]s; a single dedicated
//! ranking-worker thread pops them. Grounded on the bounded ring buffer
//! pattern in `stack_ring.rs` (`debasishg/ringmpsc`) — cache-aligned slots,
//! power-of-two capacity, const-time index masking — generalized from that
//! file's single-producer design to multiple concurrent producers using
//! Dmitry Vyukov's bounded MPMC slot-sequencing algorithm restricted to one
//! consumer. A full queue drops the push rather than blocking or retrying:
//! producers must never stall the allocation fast path waiting on the
//! ranking worker.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use crate::events::Event;

struct Slot {
    /// Sequence number arbitrating which producer/consumer may touch
    /// `value` next. Starts equal to the slot's own index.
    sequence: AtomicUsize,
    value: UnsafeCell<MaybeUninit<Event>>,
}

// SAFETY: access to `value` is arbitrated entirely through `sequence`
// compare-and-swap / load-acquire-store-release pairs in `push`/`pop`;
// at most one thread ever holds write access to a given slot at a time.
unsafe impl Sync for Slot {}

/// A bounded, lock-free, single-reader/multi-writer event queue.
pub struct EventQueue {
    buffer: Box<[Slot]>,
    mask: usize,
    enqueue_pos: CachePadded<AtomicUsize>,
    dequeue_pos: CachePadded<AtomicUsize>,
    dropped: CachePadded<AtomicU64>,
}

impl EventQueue {
    /// Creates a queue with room for `capacity` in-flight events. Rounded
    /// up to the next power of two if necessary.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let buffer: Vec<Slot> = (0..capacity)
            .map(|i| Slot {
                sequence: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();
        EventQueue {
            buffer: buffer.into_boxed_slice(),
            mask: capacity - 1,
            enqueue_pos: CachePadded::new(AtomicUsize::new(0)),
            dequeue_pos: CachePadded::new(AtomicUsize::new(0)),
            dropped: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Capacity the queue was constructed with.
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Attempts to enqueue `event`. Returns `false` (and increments the
    /// dropped-event counter) if the queue is full; never blocks.
    ///
    /// Safe to call concurrently from any number of producer threads. Does
    /// not preserve per-producer FIFO order across a full cycle of the
    /// buffer: two events from the same producer can be reordered relative
    /// to each other if a third producer's push lands between their slot
    /// claims.
    pub fn push(&self, event: Event) -> bool {
        let mut pos = self.enqueue_pos.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[pos & self.mask];
            let seq = slot.sequence.load(Ordering::Acquire);
            let diff = seq as isize - pos as isize;
            if diff == 0 {
                match self.enqueue_pos.compare_exchange_weak(
                    pos,
                    pos + 1,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        unsafe {
                            (*slot.value.get()).write(event);
                        }
                        slot.sequence.store(pos + 1, Ordering::Release);
                        return true;
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            } else {
                pos = self.enqueue_pos.load(Ordering::Relaxed);
            }
        }
    }

    /// Pops the next event, if any. Must only be called from the single
    /// designated consumer thread (the ranking worker); calling it from
    /// more than one thread concurrently breaks the single-reader
    /// invariant this queue relies on for lock-freedom.
    pub fn pop(&self) -> Option<Event> {
        let pos = self.dequeue_pos.load(Ordering::Relaxed);
        let slot = &self.buffer[pos & self.mask];
        let seq = slot.sequence.load(Ordering::Acquire);
        let diff = seq as isize - (pos as isize + 1);
        if diff != 0 {
            return None;
        }
        let value = unsafe { (*slot.value.get()).assume_init_read() };
        slot.sequence.store(pos.wrapping_add(self.mask + 1), Ordering::Release);
        self.dequeue_pos.store(pos + 1, Ordering::Relaxed);
        Some(value)
    }

    /// Total number of pushes dropped because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for EventQueue {
    fn drop(&mut self) {
        // Drain any events still buffered so their `MaybeUninit` contents
        // (Copy types here, but kept symmetric with non-Copy future
        // payloads) don't leak silently past a debug assertion elsewhere.
        while self.pop().is_some() {}
    }
}
