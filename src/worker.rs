//! Ranking worker.
//!
//! A single dedicated background thread drains the [`crate::queue::EventQueue`],
//! keeps an address-to-fingerprint index so `DestroyRemove`/`Touch`/`Realloc`
//! events (which only carry an address) can be routed back to the
//! originating call site, and periodically recomputes the hot/cold
//! threshold in [`crate::ranking::Ranking`]. Named after the original's
//! "tachanka" worker (`tachanka.c`'s `register_block`/address-keyed
//! `critnib` index, generalized here onto a plain `HashMap` since this
//! crate does not need `critnib`'s lock-free point-query properties — only
//! the worker thread ever touches the index).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::events::{Event, TouchCallback};
use crate::queue::EventQueue;
use crate::ranking::Ranking;

/// Owns the ranking worker thread's lifecycle.
///
/// Dropping a `RankingWorker` signals the thread to stop after its current
/// drain pass and joins it, so no background thread outlives its handle.
pub struct RankingWorker {
    queue: Arc<EventQueue>,
    ranking: Arc<Ranking>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// Tunables governing how often the worker recomputes the hot/cold
/// threshold and how it idles when the queue is empty.
#[derive(Clone, Copy, Debug)]
pub struct WorkerConfig {
    /// Target hot-tier byte ratio passed to
    /// [`Ranking::calculate_hot_threshold_dram_total`] on each recompute.
    pub target_ratio: f64,
    /// Minimum interval between threshold recomputations.
    pub recompute_interval: Duration,
    /// How long to sleep when the queue is observed empty, before polling
    /// again.
    pub idle_sleep: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            target_ratio: 0.2,
            recompute_interval: Duration::from_millis(100),
            idle_sleep: Duration::from_micros(200),
        }
    }
}

struct WorkerLoop {
    queue: Arc<EventQueue>,
    ranking: Arc<Ranking>,
    stop: Arc<AtomicBool>,
    config: WorkerConfig,
    addr_index: HashMap<usize, u64>,
    touch_callbacks: HashMap<usize, (TouchCallback, usize)>,
}

impl WorkerLoop {
    fn run(mut self) {
        let mut last_recompute = Instant::now();
        loop {
            match self.queue.pop() {
                Some(event) => self.apply(event),
                None => {
                    if self.stop.load(Ordering::Relaxed) {
                        return;
                    }
                    thread::sleep(self.config.idle_sleep);
                }
            }
            if last_recompute.elapsed() >= self.config.recompute_interval {
                let threshold = self
                    .ranking
                    .calculate_hot_threshold_dram_total(self.config.target_ratio);
                trace!(threshold, "ranking worker recomputed hot threshold");
                last_recompute = Instant::now();
            }
        }
    }

    fn apply(&mut self, event: Event) {
        match event {
            Event::CreateAdd {
                fingerprint,
                addr,
                size,
            } => {
                self.addr_index.insert(addr, fingerprint);
                self.ranking.add(fingerprint, size);
            }
            Event::DestroyRemove { addr } => {
                if let Some(fingerprint) = self.addr_index.remove(&addr) {
                    self.ranking.remove_relaxed(fingerprint);
                } else {
                    debug!(addr, "ranking worker: destroy for untracked address");
                }
                self.touch_callbacks.remove(&addr);
            }
            Event::Realloc {
                old_addr,
                new_addr,
                new_size,
                fingerprint,
            } => {
                if let Some(old_fp) = self.addr_index.remove(&old_addr) {
                    self.ranking.remove_relaxed(old_fp);
                }
                self.addr_index.insert(new_addr, fingerprint);
                self.ranking.add(fingerprint, new_size);
                // A callback registered against the old address describes
                // an object that no longer lives there; it is not carried
                // forward to `new_addr` even when the block grew in place
                // (`old_addr == new_addr`), since `free`+realloc-elsewhere
                // and grow-in-place are indistinguishable from here.
                if old_addr != new_addr {
                    self.touch_callbacks.remove(&old_addr);
                }
            }
            Event::Touch { addr } => {
                if let Some(fingerprint) = self.addr_index.get(&addr) {
                    self.ranking.touch(*fingerprint);
                } else {
                    debug!(addr, "ranking worker: touch for untracked address");
                }
                if let Some((cb, cb_arg)) = self.touch_callbacks.get(&addr) {
                    cb(*cb_arg);
                }
            }
            Event::SetTouchCallback { addr, cb, cb_arg } => {
                self.touch_callbacks.insert(addr, (cb, cb_arg));
            }
        }
    }
}

impl RankingWorker {
    /// Spawns the worker thread over `queue`/`ranking`.
    pub fn spawn(queue: Arc<EventQueue>, ranking: Arc<Ranking>, config: WorkerConfig) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let worker_loop = WorkerLoop {
            queue: Arc::clone(&queue),
            ranking: Arc::clone(&ranking),
            stop: Arc::clone(&stop),
            config,
            addr_index: HashMap::new(),
            touch_callbacks: HashMap::new(),
        };
        let handle = thread::Builder::new()
            .name("memtier-ranking-worker".into())
            .spawn(move || worker_loop.run())
            .expect("failed to spawn ranking worker thread");
        RankingWorker {
            queue,
            ranking,
            stop,
            handle: Some(handle),
        }
    }

    /// The ranking engine this worker feeds.
    pub fn ranking(&self) -> &Arc<Ranking> {
        &self.ranking
    }

    /// The event queue this worker drains.
    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    /// Debug/introspection accessor: `fingerprint`'s current raw hotness,
    /// or `None` if untracked. Grounded on `tachanka.c`'s `get_obj_hotness`.
    pub fn hotness_of(&self, fingerprint: u64) -> Option<f64> {
        self.ranking.hotness_of(fingerprint)
    }

    /// Signals the worker thread to stop and waits for it to exit.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RankingWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn create_then_destroy_round_trips_through_worker() {
        let queue = Arc::new(EventQueue::new(64));
        let ranking = Arc::new(Ranking::new(0.5, 0.5, false));
        let mut worker = RankingWorker::spawn(
            Arc::clone(&queue),
            Arc::clone(&ranking),
            WorkerConfig {
                recompute_interval: Duration::from_millis(5),
                idle_sleep: Duration::from_micros(50),
                ..Default::default()
            },
        );
        queue.push(Event::CreateAdd {
            fingerprint: 7,
            addr: 0x1000,
            size: 64,
        });
        // give the worker a chance to drain
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(ranking.len(), 1);
        queue.push(Event::DestroyRemove { addr: 0x1000 });
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(ranking.len(), 0);
        worker.stop();
    }

    #[test]
    fn touch_for_untracked_address_does_not_panic() {
        let queue = Arc::new(EventQueue::new(16));
        let ranking = Arc::new(Ranking::new(0.5, 0.5, false));
        let mut worker = RankingWorker::spawn(Arc::clone(&queue), Arc::clone(&ranking), WorkerConfig::default());
        queue.push(Event::Touch { addr: 0xdead });
        std::thread::sleep(Duration::from_millis(10));
        worker.stop();
    }

    static TOUCH_CALLBACK_HITS: AtomicBool = AtomicBool::new(false);

    fn record_touch_callback(cb_arg: usize) {
        assert_eq!(cb_arg, 0x2a);
        TOUCH_CALLBACK_HITS.store(true, Ordering::Relaxed);
    }

    #[test]
    fn set_touch_callback_fires_on_matching_touch() {
        let queue = Arc::new(EventQueue::new(16));
        let ranking = Arc::new(Ranking::new(0.5, 0.5, false));
        let mut worker = RankingWorker::spawn(Arc::clone(&queue), Arc::clone(&ranking), WorkerConfig::default());
        queue.push(Event::SetTouchCallback {
            addr: 0x3000,
            cb: record_touch_callback,
            cb_arg: 0x2a,
        });
        queue.push(Event::Touch { addr: 0x3000 });
        std::thread::sleep(Duration::from_millis(20));
        assert!(TOUCH_CALLBACK_HITS.load(Ordering::Relaxed));
        worker.stop();
    }

    static STALE_CALLBACK_HITS: AtomicBool = AtomicBool::new(false);

    fn record_stale_callback(_cb_arg: usize) {
        STALE_CALLBACK_HITS.store(true, Ordering::Relaxed);
    }

    #[test]
    fn destroy_clears_its_address_touch_callback() {
        let queue = Arc::new(EventQueue::new(16));
        let ranking = Arc::new(Ranking::new(0.5, 0.5, false));
        let mut worker = RankingWorker::spawn(Arc::clone(&queue), Arc::clone(&ranking), WorkerConfig::default());
        queue.push(Event::SetTouchCallback {
            addr: 0x4000,
            cb: record_stale_callback,
            cb_arg: 0,
        });
        queue.push(Event::DestroyRemove { addr: 0x4000 });
        std::thread::sleep(Duration::from_millis(10));
        // a fresh, unrelated allocation later reusing the same address must
        // not inherit the old callback.
        queue.push(Event::Touch { addr: 0x4000 });
        std::thread::sleep(Duration::from_millis(20));
        assert!(!STALE_CALLBACK_HITS.load(Ordering::Relaxed));
        worker.stop();
    }
}
