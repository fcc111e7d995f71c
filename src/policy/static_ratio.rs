//! Static-ratio placement policy.
//!
//! Grounded on `builder_static_create_memory`/
//! `memtier_policy_static_ratio_get_kind`: each tier carries a fixed
//! `kind_ratio` relative to the first tier (tier 0 is always normalized to
//! `1.0`); placement picks whichever tier's current live-byte share is
//! furthest below its target ratio.

use std::sync::Arc;

use crate::accountant::Accountant;
use crate::kind::Partition;
use crate::policy::{AllocRequest, Policy};

/// Places allocations to keep each tier's live bytes proportional to its
/// configured ratio.
#[derive(Debug)]
pub struct StaticRatio {
    kinds: Vec<Partition>,
    /// Normalized ratios; `normalized_ratios[0] == 1.0` always, matching
    /// `builder_static_create_memory`'s `cfg[0].kind_ratio / cfg[i].kind_ratio`.
    normalized_ratios: Vec<f64>,
    accountant: Arc<Accountant>,
}

impl StaticRatio {
    /// `tiers` is `(kind, kind_ratio)` pairs in the order tiers were added
    /// to the builder. `kind_ratio`s are normalized internally so only
    /// their relative magnitude matters.
    pub fn new(tiers: Vec<(Partition, f64)>, accountant: Arc<Accountant>) -> Self {
        let base_ratio = tiers[0].1;
        let kinds = tiers.iter().map(|(k, _)| *k).collect();
        let normalized_ratios = tiers.iter().map(|(_, r)| base_ratio / r).collect();
        StaticRatio {
            kinds,
            normalized_ratios,
            accountant,
        }
    }
}

impl Policy for StaticRatio {
    fn select_kind(&self, _request: AllocRequest) -> Partition {
        let size_0 = self.accountant.snapshot(self.kinds[0]).max(0) as f64;
        let mut dest_tier = 0;
        for i in 1..self.kinds.len() {
            let size_tier = self.accountant.snapshot(self.kinds[i]).max(0) as f64;
            // Tier `i`'s live bytes, scaled back up to tier 0's scale by its
            // ratio, undershooting tier 0's actual live bytes means tier `i`
            // is behind its target share, so it becomes (so far) the best
            // destination. The last tier found behind wins, matching the
            // single forward pass over `i > 0` against tier 0's snapshot.
            if size_tier * self.normalized_ratios[i] < size_0 {
                dest_tier = i;
            }
        }
        self.kinds[dest_tier]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_accountants_pick_first_tier() {
        let accountant = Arc::new(Accountant::new(2));
        let policy = StaticRatio::new(vec![(0, 1.0), (1, 1.0)], accountant);
        let kind = policy.select_kind(AllocRequest {
            size: 64,
            fingerprint: None,
        });
        assert_eq!(kind, 0);
    }

    #[test]
    fn fuller_tier_relative_to_ratio_is_avoided() {
        let accountant = Arc::new(Accountant::new(2));
        accountant.add(0, 1000);
        let policy = StaticRatio::new(vec![(0, 1.0), (1, 1.0)], accountant);
        let kind = policy.select_kind(AllocRequest {
            size: 64,
            fingerprint: None,
        });
        assert_eq!(kind, 1);
    }

    #[test]
    fn unequal_ratios_bias_selection_proportionally() {
        let accountant = Arc::new(Accountant::new(2));
        // tier 1 wants 4x tier 0's bytes (ratio 1.0 vs 4.0), but currently
        // holds less than tier 0 in absolute terms: still behind its target
        // share, so it should receive the next allocation.
        accountant.add(0, 100);
        accountant.add(1, 60);
        let policy = StaticRatio::new(vec![(0, 1.0), (1, 4.0)], accountant);
        // scaled tier1 share: 60 * (1.0/4.0) = 15, well under tier0's 100
        let kind = policy.select_kind(AllocRequest {
            size: 1,
            fingerprint: None,
        });
        assert_eq!(kind, 1);
    }

    #[test]
    fn three_tiers_keep_last_match_against_tier_zero_not_global_argmin() {
        let accountant = Arc::new(Accountant::new(3));
        // Both tier 1 and tier 2 are behind tier 0's 1:1 target, so both
        // match against tier 0's raw snapshot; the later match (tier 2)
        // must win even though tier 1 is further behind in absolute terms.
        // A global argmin across all three tiers would pick tier 1 instead.
        accountant.add(0, 100);
        accountant.add(1, 40);
        accountant.add(2, 90);
        let policy = StaticRatio::new(vec![(0, 1.0), (1, 1.0), (2, 1.0)], accountant);
        let kind = policy.select_kind(AllocRequest {
            size: 1,
            fingerprint: None,
        });
        assert_eq!(kind, 2);
    }
}
