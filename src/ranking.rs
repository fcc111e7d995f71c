//! Hotness ranking engine.
//!
//! Aggregates per-call-site hotness into a [`crate::wre_tree::WreTree`] and
//! answers "what hotness value separates the hottest `ratio` share of live
//! bytes from the rest" via weighted ordinal lookup. Grounded on
//! `ranking.cpp`: `struct ranking` (mutex-guarded `wre_tree_t` plus an
//! atomically published `hotThreshold`), `ranking_touch_entry_internal`'s
//! touch-law state machine, and
//! `ranking_calculate_hot_threshold_dram_total_internal` /
//! `_dram_pmem_internal`.
//!
//! Each call-site fingerprint owns one entry, tracked in `index` by its own
//! size and quantified hotness. The WRE tree is keyed on an order-preserving
//! encoding of quantified hotness (so in-order traversal visits buckets
//! from coldest to hottest); every fingerprint that quantizes to the same
//! bucket contributes its size to that bucket's node weight, so the tree
//! always holds one node per distinct quantified hotness value with the
//! *summed* size of every fingerprint at that value — never a single
//! fingerprint's size overwriting another's. `find_weighted` then yields
//! the hotness value at which the desired byte-fraction boundary falls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use tracing::warn;

use crate::wre_tree::WreTree;

/// `quantify`/`dequantify` compress a continuous hotness estimate into a
/// coarser integer-valued bucket before it is used as a tree key, matching
/// `ranking.cpp`'s `QUANTIFICATION_ENABLED` compile-time switch (here a
/// runtime flag via [`crate::config::Defaults::quantification_enabled`]).
#[inline]
pub fn quantify(hotness: f64, enabled: bool) -> f64 {
    if !enabled {
        return hotness;
    }
    if hotness <= 0.0 {
        f64::MIN
    } else {
        hotness.ln().floor()
    }
}

/// Inverse of [`quantify`].
#[inline]
pub fn dequantify(quantified: f64, enabled: bool) -> f64 {
    if !enabled {
        quantified
    } else if quantified <= f64::MIN {
        0.0
    } else {
        quantified.exp()
    }
}

/// Order-preserving `f64 -> u64` encoding, so comparing the encoded values
/// with ordinary unsigned comparison reproduces the `f64`'s total order.
/// Standard bit trick: flip the sign bit for non-negatives, flip every bit
/// for negatives.
fn ordered_bits(f: f64) -> u64 {
    let bits = f.to_bits();
    if bits & (1 << 63) != 0 {
        !bits
    } else {
        bits | (1 << 63)
    }
}

/// A call site's touch-law progression, per `ranking_touch_entry_internal`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TouchState {
    /// Never touched since creation.
    NotSet,
    /// Touched once; hotness is a rough first estimate.
    Init,
    /// Touched at least twice; hotness follows the steady-state windowed
    /// blend.
    InitDone,
}

struct IndexEntry {
    tree_key: u64,
    size: usize,
    hotness: f64,
    state: TouchState,
    last_touch: Instant,
}

/// Hotness ranking engine: tracks one entry per call-site fingerprint and
/// computes hot/cold thresholds on demand.
///
/// `old_weight`/`new_weight` are the touch-law blend coefficients
/// (`f = old_weight * f_prev + new_weight * f_instant`); `quantification`
/// toggles [`quantify`]/[`dequantify`].
pub struct Ranking {
    index: Mutex<HashMap<u64, IndexEntry>>,
    entries: Mutex<WreTree<f64>>,
    hot_threshold_bits: AtomicU64,
    old_weight: f64,
    new_weight: f64,
    quantification: bool,
}

impl Ranking {
    /// Creates a ranking engine with the given touch-law weights.
    pub fn new(old_weight: f64, new_weight: f64, quantification: bool) -> Self {
        Ranking {
            index: Mutex::new(HashMap::new()),
            entries: Mutex::new(WreTree::new()),
            hot_threshold_bits: AtomicU64::new(0f64.to_bits()),
            old_weight,
            new_weight,
            quantification,
        }
    }

    /// Registers a newly created allocation's call site.
    ///
    /// Corresponds to `ranking_add_internal`: a fresh entry starts with no
    /// hotness estimate and the minimal tree key (coldest-ranked), so it is
    /// excluded from the hot ratio until its first touch — except for the
    /// `is_hot` NOT_FOUND special case, which only applies before `add`
    /// has ever run for this fingerprint.
    pub fn add(&self, fingerprint: u64, size: usize) {
        let quantified = quantify(0.0, self.quantification);
        let tree_key = ordered_bits(quantified);
        let mut index = self.index.lock().unwrap();
        let mut entries = self.entries.lock().unwrap();
        if let Some(old) = index.remove(&fingerprint) {
            entries.subtract_weight(old.tree_key, old.size as f64);
        }
        entries.put(tree_key, size as f64, quantified);
        index.insert(
            fingerprint,
            IndexEntry {
                tree_key,
                size,
                hotness: 0.0,
                state: TouchState::NotSet,
                last_touch: Instant::now(),
            },
        );
    }

    /// Removes a fingerprint's entry. Warns (does not panic) if the
    /// fingerprint was never added, matching `ranking_remove_internal`'s
    /// `assert`-in-debug / log-and-ignore-in-release split.
    pub fn remove(&self, fingerprint: u64) {
        let mut index = self.index.lock().unwrap();
        let mut entries = self.entries.lock().unwrap();
        match index.remove(&fingerprint) {
            Some(old) => {
                entries.subtract_weight(old.tree_key, old.size as f64);
            }
            None => warn!(fingerprint, "ranking: remove of unknown fingerprint"),
        }
    }

    /// Removes a fingerprint's entry if present, silently no-op otherwise.
    ///
    /// Corresponds to `ranking_remove_internal_relaxed`, used on teardown
    /// paths where double-removal is expected rather than a diagnostic.
    pub fn remove_relaxed(&self, fingerprint: u64) {
        let mut index = self.index.lock().unwrap();
        let mut entries = self.entries.lock().unwrap();
        if let Some(old) = index.remove(&fingerprint) {
            entries.subtract_weight(old.tree_key, old.size as f64);
        }
    }

    /// Records a touch (read or write) against `fingerprint`'s live object,
    /// advancing the touch-law state machine.
    pub fn touch(&self, fingerprint: u64) {
        let now = Instant::now();
        let mut index = self.index.lock().unwrap();
        let Some(entry) = index.get_mut(&fingerprint) else {
            warn!(fingerprint, "ranking: touch of unknown fingerprint");
            return;
        };
        let dt = now.duration_since(entry.last_touch).as_secs_f64().max(f64::EPSILON);
        let instantaneous = 1.0 / dt;
        entry.hotness = match entry.state {
            TouchState::NotSet => {
                entry.state = TouchState::Init;
                instantaneous
            }
            TouchState::Init => {
                entry.state = TouchState::InitDone;
                self.old_weight * entry.hotness + self.new_weight * instantaneous
            }
            TouchState::InitDone => self.old_weight * entry.hotness + self.new_weight * instantaneous,
        };
        entry.last_touch = now;

        let quantified = quantify(entry.hotness, self.quantification);
        let new_key = ordered_bits(quantified);
        let size = entry.size;
        let old_key = entry.tree_key;

        // Only move this fingerprint's contribution between buckets when
        // its quantified hotness actually changed bucket. Re-`put`ting at
        // an unchanged key would double-count this fingerprint's size
        // against a bucket that may be shared with other fingerprints.
        if old_key != new_key {
            entry.tree_key = new_key;
            let mut entries = self.entries.lock().unwrap();
            entries.subtract_weight(old_key, size as f64);
            entries.put(new_key, size as f64, quantified);
        }
    }

    /// Computes the hotness threshold such that `ratio` of total live bytes
    /// (by weight) fall above it, publishes it for [`Ranking::is_hot`], and
    /// returns it.
    ///
    /// Mirrors `ranking_calculate_hot_threshold_dram_total_internal`:
    /// `wre_find_weighted(entries, 1.0 - ratio)` then dequantify (our tree
    /// is ordered coldest-first, so the top `ratio` share starts at the
    /// `1.0 - ratio` weighted percentile).
    pub fn calculate_hot_threshold_dram_total(&self, ratio: f64) -> f64 {
        let entries = self.entries.lock().unwrap();
        let quantified = entries.find_weighted(1.0 - ratio).copied().unwrap_or(0.0);
        drop(entries);
        let threshold = dequantify(quantified, self.quantification);
        self.hot_threshold_bits.store(threshold.to_bits(), Ordering::Relaxed);
        threshold
    }

    /// Same as [`Ranking::calculate_hot_threshold_dram_total`] but expressed
    /// as a DRAM:PMEM ratio `r` rather than a direct fraction, per
    /// `ranking_calculate_hot_threshold_dram_pmem_internal`:
    /// `ratio = r / (1 + r)`.
    pub fn calculate_hot_threshold_dram_pmem(&self, r: f64) -> f64 {
        let ratio = r / (1.0 + r);
        self.calculate_hot_threshold_dram_total(ratio)
    }

    /// Reports whether `fingerprint`'s current hotness exceeds the last
    /// published threshold.
    ///
    /// An unknown fingerprint is treated as hot: the ranking worker has
    /// not yet classified it, and defaulting new call sites to the fast
    /// tier is intentional, not a bug.
    pub fn is_hot(&self, fingerprint: u64) -> bool {
        let index = self.index.lock().unwrap();
        match index.get(&fingerprint) {
            Some(entry) => entry.hotness > f64::from_bits(self.hot_threshold_bits.load(Ordering::Relaxed)),
            None => true,
        }
    }

    /// Number of distinct call sites currently tracked.
    pub fn len(&self) -> usize {
        self.index.lock().unwrap().len()
    }

    /// Whether no call sites are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current published hot/cold threshold (raw hotness units, already
    /// dequantified).
    pub fn hot_threshold(&self) -> f64 {
        f64::from_bits(self.hot_threshold_bits.load(Ordering::Relaxed))
    }

    /// Returns `fingerprint`'s current raw (non-quantified) hotness
    /// estimate, or `None` if it is not tracked.
    ///
    /// Debug/introspection accessor, grounded on `tachanka.c`'s
    /// `get_obj_hotness`.
    pub fn hotness_of(&self, fingerprint: u64) -> Option<f64> {
        self.index.lock().unwrap().get(&fingerprint).map(|e| e.hotness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_remove_leaves_empty() {
        let r = Ranking::new(0.5, 0.5, false);
        r.add(1, 100);
        assert_eq!(r.len(), 1);
        r.remove(1);
        assert!(r.is_empty());
    }

    #[test]
    fn remove_relaxed_on_missing_is_noop() {
        let r = Ranking::new(0.5, 0.5, false);
        r.remove_relaxed(404);
        assert!(r.is_empty());
    }

    #[test]
    fn unknown_fingerprint_is_hot_by_default() {
        let r = Ranking::new(0.5, 0.5, false);
        assert!(r.is_hot(123));
    }

    #[test]
    fn fingerprints_sharing_a_bucket_aggregate_instead_of_clobbering() {
        // Both entries start untouched, so both quantize to the same
        // coldest bucket: the bucket's total weight must be the sum of
        // both sizes, not just the most recently added one.
        let r = Ranking::new(0.5, 0.5, false);
        r.add(1, 100);
        r.add(2, 250);
        assert_eq!(r.entries.lock().unwrap().total_weight(), 350.0);
        r.remove(1);
        assert_eq!(r.entries.lock().unwrap().total_weight(), 250.0);
        r.remove(2);
        assert_eq!(r.entries.lock().unwrap().total_weight(), 0.0);
    }

    #[test]
    fn threshold_zero_and_one_are_boundaries() {
        let r = Ranking::new(0.5, 0.5, false);
        r.add(1, 10);
        r.add(2, 90);
        // ratio=1.0 -> every byte counted hot -> lowest key qualifies
        let t_all = r.calculate_hot_threshold_dram_total(1.0);
        // ratio=0.0 -> nothing counted hot -> highest key's threshold
        let t_none = r.calculate_hot_threshold_dram_total(0.0);
        assert!(t_all <= t_none || (t_all - t_none).abs() < f64::EPSILON);
    }

    #[test]
    fn touch_progresses_state_machine_and_repositions_entry() {
        let r = Ranking::new(0.5, 0.5, false);
        r.add(1, 10);
        r.touch(1);
        std::thread::sleep(std::time::Duration::from_millis(1));
        r.touch(1);
        let index = r.index.lock().unwrap();
        assert_eq!(index.get(&1).unwrap().state, TouchState::InitDone);
    }

    #[test]
    fn quantify_dequantify_round_trip_when_enabled() {
        let h = 10.0_f64;
        let q = quantify(h, true);
        let back = dequantify(q, true);
        // quantification is lossy (floor of ln), so just check monotone
        // bucketing rather than exact round-trip.
        assert!(back > 0.0 && back <= h.exp().exp());
    }

    #[test]
    fn quantify_dequantify_identity_when_disabled() {
        assert_eq!(quantify(3.5, false), 3.5);
        assert_eq!(dequantify(3.5, false), 3.5);
    }

    #[test]
    fn dram_pmem_ratio_converts_before_delegating() {
        let r = Ranking::new(0.5, 0.5, false);
        r.add(1, 50);
        r.add(2, 50);
        // r=1 (even split) -> ratio 0.5, should not panic and should
        // publish a finite threshold.
        let t = r.calculate_hot_threshold_dram_pmem(1.0);
        assert!(t.is_finite());
    }
}
