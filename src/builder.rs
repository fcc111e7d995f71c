//! Mutable configuration builder.
//!
//! Grounded on `memtier_builder_new`/`memtier_builder_add_tier`/
//! `construct_memtier_memory` and the three `builder_*_create_memory`
//! validation routines. The original's `log_fatal`/`exit(-1)` failure
//! paths become `Result::Err(MemtierError)` here: a configuration library
//! must never abort its caller's process.

use std::sync::Arc;

use tracing::info;

use crate::accountant::Accountant;
use crate::config::{parse_ctl_path, CtlPath, Defaults, ThresholdField};
use crate::error::{MemtierError, Result};
use crate::kind::{AllocHook, Kind, Partition};
use crate::memory::MemoryHandle;
use crate::policy::data_hotness::DataHotness;
use crate::policy::dynamic_threshold::{DynamicThreshold, ThresholdCfg};
use crate::policy::static_ratio::StaticRatio;
use crate::policy::Policy;
use crate::queue::EventQueue;
use crate::ranking::Ranking;
use crate::worker::{RankingWorker, WorkerConfig};

/// Which placement policy a [`Builder`] is configuring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyKind {
    StaticRatio,
    DynamicThreshold,
    DataHotness,
}

struct TierEntry {
    kind: Arc<dyn Kind>,
    kind_ratio: f64,
}

/// Mutable builder for a tiered-memory configuration.
///
/// Add tiers with [`Builder::add_tier`], tune a dynamic-threshold policy
/// with [`Builder::ctl_set`], then freeze everything with
/// [`Builder::construct`].
pub struct Builder {
    policy_kind: PolicyKind,
    tiers: Vec<TierEntry>,
    thresholds: Vec<ThresholdCfg>,
    hook: Option<Arc<dyn AllocHook>>,
    defaults: Defaults,
}

impl Builder {
    /// Starts a new builder for `policy_kind`, using `defaults` for any
    /// constant the caller does not override via [`Builder::ctl_set`].
    pub fn new(policy_kind: PolicyKind, defaults: Defaults) -> Self {
        Builder {
            policy_kind,
            tiers: Vec::new(),
            thresholds: Vec::new(),
            hook: None,
            defaults,
        }
    }

    /// Registers `hook` to be invoked around every allocation/free once
    /// constructed.
    pub fn set_hook(&mut self, hook: Arc<dyn AllocHook>) -> &mut Self {
        self.hook = Some(hook);
        self
    }

    /// Adds a tier, in the order kinds should be preferred for the
    /// static-ratio policy / bucketed by size for the dynamic-threshold
    /// policy. `kind_ratio` is only meaningful for
    /// [`PolicyKind::StaticRatio`]; other policies ignore it.
    ///
    /// Per `memtier_builder_add_tier`, the same kind cannot be registered
    /// twice.
    pub fn add_tier(&mut self, kind: Arc<dyn Kind>, kind_ratio: f64) -> Result<&mut Self> {
        let partition = kind.partition();
        if self.tiers.iter().any(|t| t.kind.partition() == partition) {
            return Err(MemtierError::DuplicateKind);
        }
        self.tiers.push(TierEntry { kind, kind_ratio });

        if self.policy_kind == PolicyKind::DynamicThreshold && self.tiers.len() > 1 {
            // Per `builder_dynamic_update`: appending a new tier appends a
            // default threshold bracketing it against the previous tier.
            let i = self.thresholds.len();
            let step = self.defaults.threshold_step as f64;
            self.thresholds.push(ThresholdCfg {
                val: (step * (1.0 + i as f64)) as usize,
                min: (step * (0.5 + i as f64)) as usize,
                max: (step * (1.5 + i as f64)) as usize - 1,
                exp_norm_ratio: 1.0,
                check_cnt: self.defaults.threshold_check_cnt,
                trigger: self.defaults.threshold_trigger,
                degree: self.defaults.threshold_degree,
            });
        }
        Ok(self)
    }

    /// Applies a dotted-path configuration override.
    /// Only meaningful for [`PolicyKind::DynamicThreshold`].
    pub fn ctl_set(&mut self, path: &str, value: f64) -> Result<&mut Self> {
        match parse_ctl_path(path)? {
            CtlPath::Threshold { index, field } => {
                let t = self
                    .thresholds
                    .get_mut(index)
                    .ok_or(MemtierError::ThresholdIndexOutOfRange {
                        index,
                        tiers: self.tiers.len(),
                    })?;
                match field {
                    ThresholdField::Val => t.val = value as usize,
                    ThresholdField::Min => t.min = value as usize,
                    ThresholdField::Max => t.max = value as usize,
                }
            }
            CtlPath::CheckCnt | CtlPath::Trigger | CtlPath::Degree => {
                let t = self
                    .thresholds
                    .last_mut()
                    .ok_or_else(|| MemtierError::InvalidCtlPath(path.to_string()))?;
                match parse_ctl_path(path)? {
                    CtlPath::CheckCnt => t.check_cnt = value as u32,
                    CtlPath::Trigger => t.trigger = value,
                    CtlPath::Degree => t.degree = value,
                    CtlPath::Threshold { .. } => unreachable!(),
                }
            }
        }
        Ok(self)
    }

    fn validate_thresholds(&self) -> Result<()> {
        for (i, t) in self.thresholds.iter().enumerate() {
            if t.min > t.val {
                return Err(MemtierError::ThresholdMinAboveVal {
                    index: i,
                    min: t.min,
                    val: t.val,
                });
            }
            if t.val > t.max {
                return Err(MemtierError::ThresholdValAboveMax {
                    index: i,
                    val: t.val,
                    max: t.max,
                });
            }
            if t.degree < 0.0 {
                return Err(MemtierError::NegativeDegree(t.degree));
            }
            if t.trigger < 0.0 {
                return Err(MemtierError::NegativeTrigger(t.trigger));
            }
            if let Some(next) = self.thresholds.get(i + 1) {
                if t.max >= next.min {
                    return Err(MemtierError::ThresholdRangesOverlap {
                        index: i,
                        prev_max: t.max,
                        next: i + 1,
                        next_min: next.min,
                    });
                }
            }
        }
        Ok(())
    }

    /// Validates the accumulated configuration and freezes it into a
    /// [`MemoryHandle`].
    pub fn construct(self) -> Result<MemoryHandle> {
        if self.tiers.is_empty() {
            return Err(MemtierError::TooFewTiers {
                needed: 1,
                got: 0,
            });
        }

        let max_partition = self
            .tiers
            .iter()
            .map(|t| t.kind.partition())
            .max()
            .unwrap_or(0);
        let accountant = Arc::new(Accountant::new(max_partition as usize + 1));
        let kinds: Vec<Arc<dyn Kind>> = self.tiers.iter().map(|t| Arc::clone(&t.kind)).collect();

        let (policy, ranking_worker): (Box<dyn Policy>, Option<RankingWorker>) = match self.policy_kind {
            PolicyKind::StaticRatio => {
                let tiers: Vec<(Partition, f64)> = self
                    .tiers
                    .iter()
                    .map(|t| (t.kind.partition(), t.kind_ratio))
                    .collect();
                (
                    Box::new(StaticRatio::new(tiers, Arc::clone(&accountant))),
                    None,
                )
            }
            PolicyKind::DynamicThreshold => {
                if self.tiers.len() < 2 {
                    return Err(MemtierError::TooFewTiers {
                        needed: 2,
                        got: self.tiers.len(),
                    });
                }
                self.validate_thresholds()?;
                let partitions: Vec<Partition> = self.tiers.iter().map(|t| t.kind.partition()).collect();
                (
                    Box::new(DynamicThreshold::new(partitions, self.thresholds.clone(), Arc::clone(&accountant))),
                    None,
                )
            }
            PolicyKind::DataHotness => {
                if self.tiers.len() != 2 {
                    return Err(MemtierError::TierCount {
                        got: self.tiers.len(),
                    });
                }
                let fast_index = self.tiers.iter().position(|t| t.kind.is_fast());
                let Some(fast_index) = fast_index else {
                    return Err(MemtierError::NoFastTier);
                };
                let slow_index = 1 - fast_index;
                let fast = self.tiers[fast_index].kind.partition();
                let slow = self.tiers[slow_index].kind.partition();

                let ranking = Arc::new(Ranking::new(
                    self.defaults.old_time_window_hotness_weight,
                    self.defaults.new_time_window_hotness_weight,
                    self.defaults.quantification_enabled,
                ));
                let queue = Arc::new(EventQueue::new(self.defaults.ranking_buffer_size_elements));
                let worker = RankingWorker::spawn(queue, Arc::clone(&ranking), WorkerConfig::default());
                (Box::new(DataHotness::new(fast, slow, ranking)), Some(worker))
            }
        };

        info!(tiers = kinds.len(), policy = ?self.policy_kind, "memtier memory constructed");

        Ok(MemoryHandle {
            policy,
            kinds,
            accountant,
            hook: self.hook,
            ranking_worker,
            live: std::sync::Mutex::new(std::collections::HashMap::new()),
        })
    }
}
