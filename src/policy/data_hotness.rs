//! Data-hotness placement policy.
//!
//! Grounded on `memtier_policy_data_hotness_get_kind`/`_is_hot`: exactly
//! two tiers are required (enforced by
//! [`crate::builder::Builder::construct`], not here — see
//! `MemtierError::TierCount`), one marked as the fast kind via
//! [`crate::kind::Kind::is_fast`].
//! Placement asks the shared [`crate::ranking::Ranking`] engine whether the
//! allocation's call-site fingerprint is currently classified hot.

use std::sync::Arc;

use crate::kind::Partition;
use crate::policy::{AllocRequest, Policy};
use crate::ranking::Ranking;

/// Routes allocations to a fast or slow tier based on call-site hotness.
#[derive(Debug)]
pub struct DataHotness {
    fast: Partition,
    slow: Partition,
    ranking: Arc<Ranking>,
}

impl DataHotness {
    /// `fast`/`slow` must be the two tiers validated by the builder.
    pub fn new(fast: Partition, slow: Partition, ranking: Arc<Ranking>) -> Self {
        DataHotness { fast, slow, ranking }
    }
}

impl Policy for DataHotness {
    fn select_kind(&self, request: AllocRequest) -> Partition {
        let fingerprint = request
            .fingerprint
            .unwrap_or_else(|| crate::fingerprint::fingerprint(request.size));
        // An unfingerprinted/unclassified call site reads as hot: new
        // call sites default to the fast tier until the ranking worker
        // classifies them.
        if self.ranking.is_hot(fingerprint) {
            self.fast
        } else {
            self.slow
        }
    }
}
