//! Dynamic-threshold placement policy.
//!
//! Grounded on `memtier_policy_dynamic_threshold_get_kind` (size-bucket
//! routing) and `memtier_policy_dynamic_threshold_update_config` (periodic
//! threshold self-adjustment). `N` thresholds partition allocations into
//! `N + 1` tiers by requested size; every `check_cnt` allocations, each
//! threshold's `val` is nudged toward the ratio the accountant actually
//! observes between its two bracketing tiers, clamped to `[min, max]`. An
//! adjustment only happens when the observed gap from the target ratio is
//! both past `trigger` and not narrower than it was at the previous check —
//! a gap that is already closing on its own is left alone.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::accountant::Accountant;
use crate::kind::Partition;
use crate::policy::{AllocRequest, Policy};

/// One size threshold separating two adjacent tiers.
#[derive(Debug)]
struct ThresholdState {
    val: AtomicUsize,
    min: usize,
    max: usize,
    /// Target ratio of tier `i+1`'s live bytes to tier `i`'s, per
    /// `builder_dynamic_create_memory`'s `exp_norm_ratio`.
    exp_norm_ratio: f64,
    check_cnt: u32,
    trigger: f64,
    degree: f64,
    /// `|current_ratio - exp_norm_ratio|` as of the previous check, so an
    /// adjustment only fires when the gap is not shrinking on its own.
    last_ratio_diff: AtomicU64,
}

/// Static configuration for one threshold, as supplied at construction
/// time (mirrors `struct memtier_threshold_cfg`).
#[derive(Clone, Copy, Debug)]
pub struct ThresholdCfg {
    pub val: usize,
    pub min: usize,
    pub max: usize,
    pub exp_norm_ratio: f64,
    pub check_cnt: u32,
    pub trigger: f64,
    pub degree: f64,
}

/// Places allocations into `N + 1` tiers by size, with the boundary sizes
/// self-adjusting toward an observed byte ratio between adjacent tiers.
#[derive(Debug)]
pub struct DynamicThreshold {
    /// `kinds.len() == thresholds.len() + 1`; `kinds[i]` is selected for
    /// sizes below `thresholds[i].val`, and `kinds[last]` is the catch-all
    /// tier for anything at or above every threshold.
    kinds: Vec<Partition>,
    thresholds: Vec<ThresholdState>,
    accountant: Arc<Accountant>,
    alloc_counter: AtomicU32,
}

impl DynamicThreshold {
    /// `kinds.len()` must equal `threshold_cfgs.len() + 1`.
    pub fn new(kinds: Vec<Partition>, threshold_cfgs: Vec<ThresholdCfg>, accountant: Arc<Accountant>) -> Self {
        assert_eq!(kinds.len(), threshold_cfgs.len() + 1);
        let thresholds = threshold_cfgs
            .into_iter()
            .map(|c| ThresholdState {
                val: AtomicUsize::new(c.val),
                min: c.min,
                max: c.max,
                exp_norm_ratio: c.exp_norm_ratio,
                check_cnt: c.check_cnt,
                trigger: c.trigger,
                degree: c.degree,
                last_ratio_diff: AtomicU64::new(0.0f64.to_bits()),
            })
            .collect();
        DynamicThreshold {
            kinds,
            thresholds,
            accountant,
            alloc_counter: AtomicU32::new(0),
        }
    }

    /// Current boundary value for threshold `index`.
    pub fn threshold_val(&self, index: usize) -> usize {
        self.thresholds[index].val.load(Ordering::Relaxed)
    }

    /// Mirrors `memtier_policy_dynamic_threshold_update_config`'s per-pair
    /// adjustment: checked every `check_cnt` allocations, a threshold only
    /// moves when the prev/next tier ratio gap exceeds `trigger` and isn't
    /// already narrowing versus the previous check. Growing the threshold
    /// routes more, not fewer, allocations into the lower (smaller-size)
    /// tier, which is the right direction when the upper tier already holds
    /// more than its target share.
    fn adjust(&self, index: usize) {
        let t = &self.thresholds[index];
        let prev_alloc_size = self.accountant.snapshot(self.kinds[index]).max(0) as f64;
        let next_alloc_size = self.accountant.snapshot(self.kinds[index + 1]).max(0) as f64;

        let mut current_ratio = -1.0;
        if prev_alloc_size > 0.0 {
            current_ratio = next_alloc_size / prev_alloc_size;
            let prev_ratio_diff = f64::from_bits(t.last_ratio_diff.load(Ordering::Relaxed));
            let current_ratio_diff = (current_ratio - t.exp_norm_ratio).abs();
            t.last_ratio_diff.store(current_ratio_diff.to_bits(), Ordering::Relaxed);
            if current_ratio_diff < t.trigger || current_ratio_diff < prev_ratio_diff {
                // gap already within tolerance, or already closing on its
                // own: leave the threshold alone.
                return;
            }
        }

        let val = t.val.load(Ordering::Relaxed);
        let change = (val as f64 * t.degree).ceil() as usize;
        if prev_alloc_size == 0.0 || current_ratio > t.exp_norm_ratio {
            let higher = val + change;
            if higher <= t.max {
                debug!(index, old = val, new = higher, "dynamic threshold increased");
                t.val.store(higher, Ordering::Relaxed);
            }
        } else {
            let lower = val.saturating_sub(change);
            if lower >= t.min {
                debug!(index, old = val, new = lower, "dynamic threshold decreased");
                t.val.store(lower, Ordering::Relaxed);
            }
        }
    }
}

impl Policy for DynamicThreshold {
    fn select_kind(&self, request: AllocRequest) -> Partition {
        for (i, t) in self.thresholds.iter().enumerate() {
            if request.size < t.val.load(Ordering::Relaxed) {
                return self.kinds[i];
            }
        }
        *self.kinds.last().expect("at least one tier")
    }

    fn on_alloc(&self, _partition: Partition, _size: usize) {
        let n = self.alloc_counter.fetch_add(1, Ordering::Relaxed) + 1;
        for (i, t) in self.thresholds.iter().enumerate() {
            if t.check_cnt > 0 && n % t.check_cnt == 0 {
                self.adjust(i);
            }
        }
    }
}
