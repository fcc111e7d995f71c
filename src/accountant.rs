//! Sharded byte accountant.
//!
//! Tracks live bytes allocated per [`crate::kind::Kind`] under heavy
//! multi-threaded load without contending a single cache line across cores.
//! Cache-line-padded per-shard atomics,
//! relaxed ordering throughout, aggregation on read. The shard-selection and
//! flush strategy instead follow `memkind_memtier.c`'s `t_hash_64` /
//! `increment_alloc_size` / `decrement_alloc_size`: threads are mapped to
//! shards by a SplitMix64 hash (not round-robin assignment), and shards are
//! write-combining buffers flushed into a global counter once they grow
//! past [`FLUSH_THRESHOLD`].

use std::cell::Cell;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicI64, Ordering};

use crossbeam_utils::CachePadded;

use crate::kind::Partition;

/// Number of per-kind shards. A power of two so masking replaces modulo.
pub const THREAD_BUCKETS: usize = 256;

/// Once a shard's buffered delta exceeds this magnitude (bytes), it is
/// flushed into the kind's global counter (≈ 50 KiB).
pub const FLUSH_THRESHOLD: i64 = 50 * 1024;

thread_local! {
    /// This thread's SplitMix64-derived shard index, computed once and
    /// cached for the thread's lifetime.
    static SHARD_INDEX: Cell<Option<usize>> = Cell::new(None);
}

/// SplitMix64 avalanche mix, per `memkind_memtier.c`'s `t_hash_64`.
#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e3779b97f4a7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}

/// Maps the current thread to a shard in `[0, THREAD_BUCKETS)`.
///
/// The original hashes `pthread_self()` directly; Rust exposes no stable
/// integer view of `ThreadId`, so we hash the `ThreadId` itself to seed the
/// same SplitMix64 mix before masking to 8 bits.
fn current_shard() -> usize {
    SHARD_INDEX.with(|cell| {
        if let Some(idx) = cell.get() {
            return idx;
        }
        let mut hasher = DefaultHasher::new();
        std::thread::current().id().hash(&mut hasher);
        let idx = (splitmix64(hasher.finish()) as usize) & (THREAD_BUCKETS - 1);
        cell.set(Some(idx));
        idx
    })
}

/// One kind's set of shards plus its flushed global total.
struct KindCounters {
    shards: Box<[CachePadded<AtomicI64>; THREAD_BUCKETS]>,
    global: CachePadded<AtomicI64>,
}

impl KindCounters {
    fn new() -> Self {
        let shards: Vec<CachePadded<AtomicI64>> = (0..THREAD_BUCKETS)
            .map(|_| CachePadded::new(AtomicI64::new(0)))
            .collect();
        KindCounters {
            shards: shards.into_boxed_slice().try_into().ok().unwrap(),
            global: CachePadded::new(AtomicI64::new(0)),
        }
    }
}

/// Sharded, approximately-consistent live-byte counter, one instance per
/// tiered-memory configuration, indexed by [`Partition`].
///
/// `add`/`sub` are wait-free in the common path: each thread only ever
/// touches its own shard and, rarely, the kind's global counter. `snapshot`
/// is more expensive (sums every shard) but that is the intended trade-off.
pub struct Accountant {
    kinds: Vec<KindCounters>,
}

impl Accountant {
    /// Creates an accountant tracking `kind_count` kinds (partitions
    /// `0..kind_count`).
    pub fn new(kind_count: usize) -> Self {
        Accountant {
            kinds: (0..kind_count).map(|_| KindCounters::new()).collect(),
        }
    }

    fn kind(&self, partition: Partition) -> &KindCounters {
        &self.kinds[partition as usize]
    }

    /// Adds `bytes` to `kind`'s live-byte total.
    #[inline]
    pub fn add(&self, partition: Partition, bytes: usize) {
        let kind = self.kind(partition);
        let shard = &kind.shards[current_shard()];
        let prior = shard.fetch_add(bytes as i64, Ordering::Relaxed);
        if (prior + bytes as i64).abs() > FLUSH_THRESHOLD {
            let drained = shard.swap(0, Ordering::Relaxed);
            kind.global.fetch_add(drained, Ordering::Relaxed);
        }
    }

    /// Subtracts `bytes` from `kind`'s live-byte total.
    #[inline]
    pub fn sub(&self, partition: Partition, bytes: usize) {
        let kind = self.kind(partition);
        let shard = &kind.shards[current_shard()];
        let prior = shard.fetch_sub(bytes as i64, Ordering::Relaxed);
        if (prior - bytes as i64).abs() > FLUSH_THRESHOLD {
            let drained = shard.swap(0, Ordering::Relaxed);
            kind.global.fetch_add(drained, Ordering::Relaxed);
        }
    }

    /// Flushes every shard into the global counter and returns the exact
    /// total live bytes for `kind` at this instant (modulo concurrent
    /// writers racing the snapshot, which only ever lose or gain a single
    /// in-flight update).
    pub fn snapshot(&self, partition: Partition) -> i64 {
        let kind = self.kind(partition);
        for shard in kind.shards.iter() {
            let drained = shard.swap(0, Ordering::Relaxed);
            if drained != 0 {
                kind.global.fetch_add(drained, Ordering::Relaxed);
            }
        }
        kind.global.load(Ordering::Relaxed)
    }

    /// Zeroes every shard and the global counter for `kind`.
    pub fn reset(&self, partition: Partition) {
        let kind = self.kind(partition);
        for shard in kind.shards.iter() {
            shard.store(0, Ordering::Relaxed);
        }
        kind.global.store(0, Ordering::Relaxed);
    }

    /// Number of kinds this accountant was sized for.
    pub fn kind_count(&self) -> usize {
        self.kinds.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn add_and_snapshot_single_threaded() {
        let acc = Accountant::new(1);
        acc.add(0, 100);
        acc.add(0, 50);
        assert_eq!(acc.snapshot(0), 150);
    }

    #[test]
    fn sub_clamps_to_exact_net() {
        let acc = Accountant::new(1);
        acc.add(0, 1000);
        acc.sub(0, 400);
        assert_eq!(acc.snapshot(0), 600);
    }

    #[test]
    fn flush_threshold_moves_into_global() {
        let acc = Accountant::new(1);
        // comfortably exceeds FLUSH_THRESHOLD to force at least one flush
        acc.add(0, (FLUSH_THRESHOLD as usize) * 3);
        assert_eq!(acc.snapshot(0), FLUSH_THRESHOLD * 3);
    }

    #[test]
    fn reset_zeroes_everything() {
        let acc = Accountant::new(1);
        acc.add(0, 5000);
        acc.reset(0);
        assert_eq!(acc.snapshot(0), 0);
    }

    #[test]
    fn independent_kinds_do_not_interfere() {
        let acc = Accountant::new(2);
        acc.add(0, 10);
        acc.add(1, 20);
        assert_eq!(acc.snapshot(0), 10);
        assert_eq!(acc.snapshot(1), 20);
    }

    #[test]
    fn concurrent_adds_net_exactly() {
        let acc = Arc::new(Accountant::new(1));
        let threads = 8;
        let per_thread = 10_000usize;
        let mut handles = Vec::new();
        for _ in 0..threads {
            let acc = Arc::clone(&acc);
            handles.push(thread::spawn(move || {
                for _ in 0..per_thread {
                    acc.add(0, 7);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(acc.snapshot(0), (threads * per_thread * 7) as i64);
    }

    #[test]
    fn concurrent_add_and_sub_converge_to_exact_net() {
        let acc = Arc::new(Accountant::new(1));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let acc = Arc::clone(&acc);
            handles.push(thread::spawn(move || {
                for _ in 0..5_000 {
                    acc.add(0, 13);
                }
            }));
        }
        for _ in 0..4 {
            let acc = Arc::clone(&acc);
            handles.push(thread::spawn(move || {
                for _ in 0..5_000 {
                    acc.sub(0, 5);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(acc.snapshot(0), 4 * 5_000 * 13 - 4 * 5_000 * 5);
    }
}
