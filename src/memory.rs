//! The immutable, constructed memory configuration.
//!
//! `MemoryHandle` is what a [`crate::builder::Builder`] freezes into via
//! `construct()`; it is the direct analogue of `struct memtier_memory`,
//! minus the original's function-pointer dispatch table (Rust's
//! `Box<dyn Policy>` serves the same purpose through ordinary dynamic
//! dispatch). The allocation entry points themselves
//! (`malloc`/`calloc`/`realloc`/`posix_memalign`/`free`/`usable_size`) are
//! implemented on this type in `facade.rs`, kept in a separate file since
//! that is a distinct concern: this file is about what a constructed
//! configuration *is*, `facade.rs` is about what you *do* with one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::accountant::Accountant;
use crate::kind::{AllocHook, Kind, Partition};
use crate::policy::Policy;
use crate::worker::RankingWorker;

/// Per-live-pointer bookkeeping the façade needs to route `realloc`/`free`
/// back to the kind that produced a pointer, and to route `touch` back to
/// a fingerprint. The original doesn't need this: `memkind`'s own API
/// takes the kind as an explicit parameter on every call. This crate's
/// façade instead looks the kind up itself, so callers only ever see one
/// opaque `MemoryHandle`.
pub(crate) struct LiveAlloc {
    pub(crate) partition: Partition,
    pub(crate) fingerprint: u64,
    pub(crate) size: usize,
}

/// A validated, immutable tiered-memory configuration produced by
/// [`crate::builder::Builder::construct`].
pub struct MemoryHandle {
    pub(crate) policy: Box<dyn Policy>,
    pub(crate) kinds: Vec<Arc<dyn Kind>>,
    pub(crate) accountant: Arc<Accountant>,
    pub(crate) hook: Option<Arc<dyn AllocHook>>,
    /// Present only for the data-hotness policy, which is the only one
    /// that needs call-site ranking.
    pub(crate) ranking_worker: Option<RankingWorker>,
    pub(crate) live: Mutex<HashMap<usize, LiveAlloc>>,
}

impl MemoryHandle {
    /// Number of tiers configured.
    pub fn tier_count(&self) -> usize {
        self.kinds.len()
    }

    /// Live bytes currently accounted for `partition`.
    pub fn live_bytes(&self, partition: Partition) -> i64 {
        self.accountant.snapshot(partition)
    }

    /// Whether this handle's policy drives a background ranking worker
    /// (true only for the data-hotness policy).
    pub fn has_ranking_worker(&self) -> bool {
        self.ranking_worker.is_some()
    }

    /// Debug/introspection accessor exposing a call site's current
    /// raw hotness, when the data-hotness policy and its ranking worker
    /// are active.
    pub fn hotness_of(&self, fingerprint: u64) -> Option<f64> {
        self.ranking_worker.as_ref()?.hotness_of(fingerprint)
    }
}

impl std::fmt::Debug for MemoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHandle")
            .field("tiers", &self.kinds)
            .field("has_ranking_worker", &self.has_ranking_worker())
            .finish()
    }
}
