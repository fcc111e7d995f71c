//! Placement policies.
//!
//! A [`Policy`] decides, for each allocation, which tier's
//! [`crate::kind::Partition`] it should land on. Three concrete policies
//! are provided, each a direct generalization of a function family in
//! `memkind_memtier.c`: [`static_ratio::StaticRatio`]
//! (`memtier_policy_static_ratio_get_kind`),
//! [`dynamic_threshold::DynamicThreshold`]
//! (`memtier_policy_dynamic_threshold_get_kind`/`_update_config`), and
//! [`data_hotness::DataHotness`] (`memtier_policy_data_hotness_get_kind`/
//! `_is_hot`).

pub mod data_hotness;
pub mod dynamic_threshold;
pub mod static_ratio;

use std::fmt::Debug;

use crate::kind::Partition;

/// The inputs a policy needs to pick a tier for one allocation.
#[derive(Clone, Copy, Debug)]
pub struct AllocRequest {
    /// Requested size in bytes.
    pub size: usize,
    /// The call-site fingerprint, when fingerprinting is in use (data-
    /// hotness policy only; other policies ignore it).
    pub fingerprint: Option<u64>,
}

/// Common interface the façade drives: select a tier, then (for policies
/// that self-adjust) observe each completed allocation.
pub trait Policy: Debug + Send + Sync {
    /// Chooses which tier `request` should be placed on.
    fn select_kind(&self, request: AllocRequest) -> Partition;

    /// Called once per completed allocation, after the kind has actually
    /// allocated and the accountant has recorded it. Policies with no
    /// self-adjustment behavior (static ratio, data hotness) use the
    /// default no-op.
    fn on_alloc(&self, _partition: Partition, _size: usize) {}
}
