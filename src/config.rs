//! Tunable constants and the `ctl_set` dotted-path configuration parser.
//!
//! `Defaults` centralizes the constants `memkind_memtier.c` hardcodes as
//! C preprocessor `#define`s. `parse_ctl_path` is a small hand parser
//! standing in for the original's `sscanf("policy.dynamic_threshold.
//! thresholds[%d].%s", ...)` call, producing a typed path the builder can
//! match on instead of re-parsing strings at every call site.

use crate::error::MemtierError;

/// Tunable constants governing the dynamic-threshold and hotness-ranking
/// policies. Grounded directly on `memkind_memtier.c`'s `#define`d
/// defaults and `ranking.cpp`'s windowed-hotness weights.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Defaults {
    /// Size-bucket width used when a threshold is appended via
    /// `builder_dynamic_update`'s default `min`/`val`/`max` derivation.
    pub threshold_step: usize,
    /// Number of allocations between self-adjustment checks for a
    /// dynamic-threshold tier (`memtier_policy_dynamic_threshold_update_config`).
    pub threshold_check_cnt: u32,
    /// Ratio-divergence that must be exceeded before a threshold is
    /// nudged.
    pub threshold_trigger: f64,
    /// Fractional amount a threshold is nudged by when triggered.
    pub threshold_degree: f64,
    /// Touch-law blend weight applied to an entry's prior hotness
    /// estimate (`ranking.cpp`'s `oldWeight`).
    pub old_time_window_hotness_weight: f64,
    /// Touch-law blend weight applied to the instantaneous touch
    /// frequency (`ranking.cpp`'s `newWeight`).
    pub new_time_window_hotness_weight: f64,
    /// Capacity of the event queue feeding the ranking worker.
    pub ranking_buffer_size_elements: usize,
    /// Whether hotness values are quantified (log-bucketed) before being
    /// used as WRE-tree keys, or used as raw `f64`s.
    pub quantification_enabled: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Defaults {
            threshold_step: 1024,
            threshold_check_cnt: 20,
            threshold_trigger: 0.02,
            threshold_degree: 0.15,
            old_time_window_hotness_weight: 0.8,
            new_time_window_hotness_weight: 0.2,
            ranking_buffer_size_elements: 16 * 1024,
            quantification_enabled: true,
        }
    }
}

/// Which field of a dynamic-threshold tier a `ctl_set` path addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThresholdField {
    Val,
    Min,
    Max,
}

/// A parsed `ctl_set` path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CtlPath {
    /// `policy.dynamic_threshold.thresholds[i].{val,min,max}`
    Threshold { index: usize, field: ThresholdField },
    /// `policy.dynamic_threshold.check_cnt`
    CheckCnt,
    /// `policy.dynamic_threshold.trigger`
    Trigger,
    /// `policy.dynamic_threshold.degree`
    Degree,
}

/// Parses a dotted `ctl_set` path string into a [`CtlPath`].
///
/// Mirrors the shape `builder_dynamic_ctl_set` accepts, without requiring
/// a format-string scanning crate: the original uses `sscanf` purely as a
/// string splitter, which a hand-rolled parser does just as directly here.
pub fn parse_ctl_path(path: &str) -> Result<CtlPath, MemtierError> {
    let rest = path
        .strip_prefix("policy.dynamic_threshold.")
        .ok_or_else(|| MemtierError::InvalidCtlPath(path.to_string()))?;

    if let Some(index_and_field) = rest.strip_prefix("thresholds[") {
        let (index_str, after) = index_and_field
            .split_once(']')
            .ok_or_else(|| MemtierError::InvalidCtlPath(path.to_string()))?;
        let index: usize = index_str
            .parse()
            .map_err(|_| MemtierError::InvalidCtlPath(path.to_string()))?;
        let field = after
            .strip_prefix('.')
            .ok_or_else(|| MemtierError::InvalidCtlPath(path.to_string()))?;
        let field = match field {
            "val" => ThresholdField::Val,
            "min" => ThresholdField::Min,
            "max" => ThresholdField::Max,
            _ => return Err(MemtierError::InvalidCtlPath(path.to_string())),
        };
        return Ok(CtlPath::Threshold { index, field });
    }

    match rest {
        "check_cnt" => Ok(CtlPath::CheckCnt),
        "trigger" => Ok(CtlPath::Trigger),
        "degree" => Ok(CtlPath::Degree),
        _ => Err(MemtierError::InvalidCtlPath(path.to_string())),
    }
}
