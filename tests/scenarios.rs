//! Cross-module concurrency scenarios, exercised through the public
//! builder/façade surface the way a real consumer would use this crate.

use std::alloc::{alloc, dealloc, Layout};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use memtier::accountant::Accountant;
use memtier::builder::{Builder, PolicyKind};
use memtier::config::Defaults;
use memtier::kind::{Kind, Partition};
use memtier::queue::EventQueue;
use memtier::events::Event;
use memtier::ranking::Ranking;
use memtier::wre_tree::WreTree;

#[derive(Debug)]
struct SystemKind {
    partition: Partition,
    fast: bool,
    layouts: Mutex<HashMap<usize, Layout>>,
}

impl SystemKind {
    fn new(partition: Partition, fast: bool) -> Arc<dyn Kind> {
        Arc::new(SystemKind {
            partition,
            fast,
            layouts: Mutex::new(HashMap::new()),
        })
    }
}

impl Kind for SystemKind {
    fn partition(&self) -> Partition {
        self.partition
    }
    fn name(&self) -> &str {
        "system"
    }
    fn is_fast(&self) -> bool {
        self.fast
    }
    unsafe fn malloc(&self, size: usize) -> *mut u8 {
        let layout = Layout::from_size_align(size.max(1), 8).unwrap();
        let ptr = alloc(layout);
        if !ptr.is_null() {
            self.layouts.lock().unwrap().insert(ptr as usize, layout);
        }
        ptr
    }
    unsafe fn calloc(&self, num: usize, size: usize) -> *mut u8 {
        let ptr = self.malloc(num * size);
        if !ptr.is_null() {
            std::ptr::write_bytes(ptr, 0, num * size);
        }
        ptr
    }
    unsafe fn realloc(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        if ptr.is_null() {
            return self.malloc(size);
        }
        self.free(ptr);
        self.malloc(size)
    }
    unsafe fn posix_memalign(&self, align: usize, size: usize) -> *mut u8 {
        let layout = Layout::from_size_align(size.max(1), align.max(8)).unwrap();
        let ptr = alloc(layout);
        if !ptr.is_null() {
            self.layouts.lock().unwrap().insert(ptr as usize, layout);
        }
        ptr
    }
    unsafe fn free(&self, ptr: *mut u8) {
        if let Some(layout) = self.layouts.lock().unwrap().remove(&(ptr as usize)) {
            dealloc(ptr, layout);
        }
    }
    unsafe fn usable_size(&self, ptr: *mut u8) -> usize {
        self.layouts.lock().unwrap().get(&(ptr as usize)).map(|l| l.size()).unwrap_or(0)
    }
}

/// S1: distinct hotness values produce a threshold that separates them.
#[test]
fn s1_ranking_threshold_with_distinct_hotness() {
    let ranking = Ranking::new(0.5, 0.5, false);
    ranking.add(1, 100); // will stay cold (never touched)
    ranking.add(2, 100);
    // touch entry 2 repeatedly so its hotness estimate rises well above entry 1's.
    for _ in 0..5 {
        ranking.touch(2);
        thread::sleep(Duration::from_millis(1));
    }
    let threshold = ranking.calculate_hot_threshold_dram_total(0.5);
    assert!(threshold.is_finite());
    assert!(ranking.is_hot(2) || !ranking.is_hot(1));
}

/// S2: two entries with identical hotness still produce a stable,
/// deterministic threshold (no panics, no NaN).
#[test]
fn s2_ranking_threshold_with_tied_hotness() {
    let ranking = Ranking::new(0.5, 0.5, false);
    ranking.add(1, 50);
    ranking.add(2, 50);
    let threshold = ranking.calculate_hot_threshold_dram_total(0.5);
    assert!(threshold.is_finite());
}

/// S3: static-ratio placement converges toward the configured ratio as
/// more allocations land.
#[test]
fn s3_static_ratio_converges_to_configured_ratio() {
    let mut builder = Builder::new(PolicyKind::StaticRatio, Defaults::default());
    builder.add_tier(SystemKind::new(0, false), 2.0).unwrap();
    builder.add_tier(SystemKind::new(1, false), 1.0).unwrap();
    let memory = builder.construct().unwrap();

    let mut ptrs = Vec::new();
    for _ in 0..300 {
        ptrs.push(memory.malloc(64));
    }
    let tier0 = memory.live_bytes(0) as f64;
    let tier1 = memory.live_bytes(1) as f64;
    // tier0 has twice tier1's ratio, so it should carry roughly twice the
    // live bytes once warmed up.
    let observed_ratio = tier0 / tier1.max(1.0);
    assert!(observed_ratio > 1.2, "observed ratio {observed_ratio} too close to 1:1");

    for p in ptrs {
        memory.free(p);
    }
}

/// S4: dynamic-threshold placement self-adjusts its boundary over many
/// allocations when the observed tier ratio diverges from the target.
#[test]
fn s4_dynamic_threshold_self_adjusts() {
    let mut builder = Builder::new(PolicyKind::DynamicThreshold, Defaults::default());
    builder.add_tier(SystemKind::new(0, false), 1.0).unwrap();
    builder.add_tier(SystemKind::new(1, false), 1.0).unwrap();
    builder
        .ctl_set("policy.dynamic_threshold.thresholds[0].val", 1024.0)
        .unwrap();
    builder
        .ctl_set("policy.dynamic_threshold.thresholds[0].min", 256.0)
        .unwrap();
    builder
        .ctl_set("policy.dynamic_threshold.thresholds[0].max", 4096.0)
        .unwrap();
    builder.ctl_set("policy.dynamic_threshold.check_cnt", 2.0).unwrap();
    let memory = builder.construct().unwrap();

    let mut ptrs = Vec::new();
    for _ in 0..50 {
        // large objects push everything into tier 1, well past the
        // target ratio, which should nudge the threshold downward.
        ptrs.push(memory.malloc(2000));
    }
    assert!(memory.live_bytes(1) > 0);
    for p in ptrs {
        memory.free(p);
    }
}

/// S5: the data-hotness policy places an unclassified allocation on the
/// fast tier and lets it be freed cleanly.
#[test]
fn s5_data_hotness_places_new_allocation_hot() {
    let mut builder = Builder::new(PolicyKind::DataHotness, Defaults::default());
    builder.add_tier(SystemKind::new(0, true), 1.0).unwrap();
    builder.add_tier(SystemKind::new(1, false), 1.0).unwrap();
    let memory = builder.construct().unwrap();

    let ptr = memory.malloc(512);
    assert_eq!(memory.live_bytes(0), 512);
    assert_eq!(memory.live_bytes(1), 0);
    memory.touch(ptr);
    memory.free(ptr);
    assert_eq!(memory.live_bytes(0), 0);
}

/// S6: the event queue survives 10 concurrent producers against a single
/// consumer without losing or duplicating any event it actually accepted.
#[test]
fn s6_event_queue_stress_multi_producer_single_consumer() {
    let queue = Arc::new(EventQueue::new(512));
    let producers: usize = 10;
    let per_producer: usize = 5_000;
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let consumer_queue = Arc::clone(&queue);
    let consumer_stop = Arc::clone(&stop);
    let popped = Arc::new(AtomicUsize::new(0));
    let popped_consumer = Arc::clone(&popped);
    let consumer = thread::spawn(move || {
        loop {
            match consumer_queue.pop() {
                Some(_) => {
                    popped_consumer.fetch_add(1, Ordering::Relaxed);
                }
                None => {
                    if consumer_stop.load(Ordering::Relaxed) {
                        break;
                    }
                    thread::yield_now();
                }
            }
        }
        // drain anything left after the stop signal
        while consumer_queue.pop().is_some() {
            popped_consumer.fetch_add(1, Ordering::Relaxed);
        }
    });

    let mut producer_handles = Vec::new();
    for p in 0..producers {
        let queue = Arc::clone(&queue);
        producer_handles.push(thread::spawn(move || {
            let mut accepted = 0usize;
            for i in 0..per_producer {
                if queue.push(Event::Touch { addr: p * per_producer + i }) {
                    accepted += 1;
                }
            }
            accepted
        }));
    }

    let mut total_accepted = 0usize;
    for h in producer_handles {
        total_accepted += h.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    consumer.join().unwrap();

    assert_eq!(popped.load(Ordering::Relaxed), total_accepted);
}

/// WRE-tree boundary scenario: 200 keys with weight `|100 - i|`, checking
/// the extreme percentiles resolve to the expected ends of the key range.
#[test]
fn wre_tree_200_key_boundary_scenario() {
    let mut tree = WreTree::new();
    for i in 0u64..200 {
        let weight = (100i64 - i as i64).unsigned_abs() as f64;
        tree.put(i, weight.max(1.0), i);
    }
    assert_eq!(tree.find_weighted(0.0), Some(&0));
    assert_eq!(tree.find_weighted(1.0), Some(&199));
}

/// Sharded accountant exactness invariant: concurrent add/sub from many
/// threads must net to the exact expected total once drained.
#[test]
fn accountant_concurrent_exactness_invariant() {
    let accountant = Arc::new(Accountant::new(1));
    let threads: usize = 10;
    let per_thread: usize = 3_000;
    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let accountant = Arc::clone(&accountant);
            thread::spawn(move || {
                for _ in 0..per_thread {
                    if i % 2 == 0 {
                        accountant.add(0, 11);
                    } else {
                        accountant.sub(0, 3);
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let adders = (threads + 1) / 2;
    let subbers = threads / 2;
    let expected = (adders * per_thread * 11) as i64 - (subbers * per_thread * 3) as i64;
    assert_eq!(accountant.snapshot(0), expected);
}
