//! Allocation façade.
//!
//! `malloc`/`calloc`/`realloc`/`posix_memalign`/`free`/`usable_size`, each
//! driving the same fixed pipeline: ask the [`crate::policy::Policy`]
//! which tier to use, forward to that tier's [`crate::kind::Kind`], record
//! the result in the [`crate::accountant::Accountant`], then (when a
//! ranking worker is active) notify it over the event queue. Grounded on
//! `memkind_memtier.c`'s `memtier_kind_malloc`/`memtier_realloc`/
//! `memtier_free` family and `_post_alloc`'s `EVENT_CREATE_ADD` push.

use std::sync::Arc;

use crate::events::{Event, TouchCallback};
use crate::fingerprint;
use crate::kind::{Kind, Partition};
use crate::memory::{LiveAlloc, MemoryHandle};
use crate::policy::AllocRequest;

impl MemoryHandle {
    fn kind_for(&self, partition: Partition) -> &Arc<dyn Kind> {
        self.kinds
            .iter()
            .find(|k| k.partition() == partition)
            .expect("policy selected a partition with no matching configured kind")
    }

    fn record_alloc(&self, partition: Partition, kind: &Arc<dyn Kind>, ptr: *mut u8, fingerprint: u64, requested_size: usize) {
        if ptr.is_null() {
            return;
        }
        let real_size = unsafe { kind.usable_size(ptr) };
        let accounted = if real_size > 0 { real_size } else { requested_size };

        self.accountant.add(partition, accounted);
        self.policy.on_alloc(partition, accounted);
        if let Some(hook) = &self.hook {
            hook.post_alloc(partition, ptr, accounted);
        }
        if let Some(worker) = &self.ranking_worker {
            worker.queue().push(Event::CreateAdd {
                fingerprint,
                addr: ptr as usize,
                size: accounted,
            });
        }
        self.live.lock().unwrap().insert(
            ptr as usize,
            LiveAlloc {
                partition,
                fingerprint,
                size: accounted,
            },
        );
    }

    fn forget_alloc(&self, ptr: *mut u8) -> Option<LiveAlloc> {
        self.live.lock().unwrap().remove(&(ptr as usize))
    }

    /// Allocates `size` bytes, placed by this handle's policy.
    pub fn malloc(&self, size: usize) -> *mut u8 {
        let fingerprint = fingerprint::fingerprint(size);
        let partition = self.policy.select_kind(AllocRequest {
            size,
            fingerprint: Some(fingerprint),
        });
        let kind = self.kind_for(partition);
        let ptr = unsafe { kind.malloc(size) };
        self.record_alloc(partition, kind, ptr, fingerprint, size);
        ptr
    }

    /// Allocates zeroed storage for `num` elements of `size` bytes each.
    pub fn calloc(&self, num: usize, size: usize) -> *mut u8 {
        let total = num.saturating_mul(size);
        let fingerprint = fingerprint::fingerprint(total);
        let partition = self.policy.select_kind(AllocRequest {
            size: total,
            fingerprint: Some(fingerprint),
        });
        let kind = self.kind_for(partition);
        let ptr = unsafe { kind.calloc(num, size) };
        self.record_alloc(partition, kind, ptr, fingerprint, total);
        ptr
    }

    /// Allocates `size` bytes aligned to `align`.
    pub fn posix_memalign(&self, align: usize, size: usize) -> *mut u8 {
        let fingerprint = fingerprint::fingerprint(size);
        let partition = self.policy.select_kind(AllocRequest {
            size,
            fingerprint: Some(fingerprint),
        });
        let kind = self.kind_for(partition);
        let ptr = unsafe { kind.posix_memalign(align, size) };
        self.record_alloc(partition, kind, ptr, fingerprint, size);
        ptr
    }

    /// Resizes a previous allocation from this handle, keeping it on the
    /// same tier it was originally placed on (the original does not
    /// re-run placement on realloc either: `memtier_realloc` stays on the
    /// kind the pointer already belongs to).
    pub fn realloc(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        if ptr.is_null() {
            return self.malloc(size);
        }
        let Some(old) = self.forget_alloc(ptr) else {
            // Unknown pointer: nothing this façade allocated. Fall back to
            // treating it as a fresh allocation rather than guessing.
            return self.malloc(size);
        };
        let kind = self.kind_for(old.partition);
        let new_ptr = unsafe { kind.realloc(ptr, size) };
        if new_ptr.is_null() {
            return new_ptr;
        }
        let real_size = unsafe { kind.usable_size(new_ptr) };
        let accounted = if real_size > 0 { real_size } else { size };

        self.accountant.sub(old.partition, old.size);
        self.accountant.add(old.partition, accounted);
        if let Some(worker) = &self.ranking_worker {
            worker.queue().push(Event::Realloc {
                old_addr: ptr as usize,
                new_addr: new_ptr as usize,
                new_size: accounted,
                fingerprint: old.fingerprint,
            });
        }
        self.live.lock().unwrap().insert(
            new_ptr as usize,
            LiveAlloc {
                partition: old.partition,
                fingerprint: old.fingerprint,
                size: accounted,
            },
        );
        new_ptr
    }

    /// Frees a pointer previously returned by this handle.
    pub fn free(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let Some(old) = self.forget_alloc(ptr) else {
            return;
        };
        let kind = self.kind_for(old.partition);
        if let Some(hook) = &self.hook {
            hook.pre_free(old.partition, ptr);
        }
        unsafe {
            kind.free(ptr);
        }
        self.accountant.sub(old.partition, old.size);
        if let Some(worker) = &self.ranking_worker {
            worker.queue().push(Event::DestroyRemove { addr: ptr as usize });
        }
    }

    /// Reports the tracked size of a live allocation, or `0` if `ptr` is
    /// not one this handle produced.
    pub fn usable_size(&self, ptr: *mut u8) -> usize {
        self.live
            .lock()
            .unwrap()
            .get(&(ptr as usize))
            .map(|a| a.size)
            .unwrap_or(0)
    }

    /// Records a touch (read or write) against a live allocation, feeding
    /// the data-hotness policy's ranking worker. A no-op for policies with
    /// no ranking worker, or for pointers this handle did not allocate.
    pub fn touch(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        if let Some(worker) = &self.ranking_worker {
            if self.live.lock().unwrap().contains_key(&(ptr as usize)) {
                worker.queue().push(Event::Touch { addr: ptr as usize });
            }
        }
    }

    /// Registers `cb` to be invoked with `cb_arg` whenever `ptr` is
    /// subsequently touched. Informational only — tests use this to observe
    /// that a touch reached the ranking worker; it never influences
    /// placement or hotness. A no-op for policies with no ranking worker.
    pub fn set_touch_callback(&self, ptr: *mut u8, cb: TouchCallback, cb_arg: usize) {
        if let Some(worker) = &self.ranking_worker {
            worker.queue().push(Event::SetTouchCallback {
                addr: ptr as usize,
                cb,
                cb_arg,
            });
        }
    }
}
