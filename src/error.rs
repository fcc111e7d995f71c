//! Error types surfaced by builder-time validation and runtime diagnostics.
//!
//! Nothing on the allocation fast path is recoverable: the
//! only user-visible failures are configuration errors raised while a
//! [`crate::builder::Builder`] is being constructed. Invariant violations
//! that the original implementation aborts on in debug builds and silently
//! elides in release builds are logged here via `tracing` and elided,
//! never propagated across threads.

use thiserror::Error;

/// Errors a [`crate::builder::Builder`] can report at `construct()` time.
#[derive(Debug, Error, PartialEq)]
pub enum MemtierError {
    /// `Builder::new` received a policy tag the builder does not recognize.
    #[error("unrecognized placement policy")]
    UnknownPolicy,

    /// `add_tier` was called twice with the same [`crate::kind::Kind`].
    #[error("kind is already registered in this builder")]
    DuplicateKind,

    /// A policy requires more tiers than were configured.
    #[error("too few tiers configured: need at least {needed}, got {got}")]
    TooFewTiers {
        /// Minimum tier count the policy requires.
        needed: usize,
        /// Tier count actually configured.
        got: usize,
    },

    /// The data-hotness policy requires exactly two tiers.
    #[error("data-hotness policy requires exactly 2 tiers, got {got}")]
    TierCount {
        /// Tier count actually configured.
        got: usize,
    },

    /// Data-hotness policy could not determine which configured tier is fast.
    #[error("no tier marked as the fast kind for the data-hotness policy")]
    NoFastTier,

    /// A threshold's `min` exceeds its `val`.
    #[error("threshold {index}: min ({min}) exceeds val ({val})")]
    ThresholdMinAboveVal {
        /// Index of the offending threshold.
        index: usize,
        /// Configured minimum.
        min: usize,
        /// Configured value.
        val: usize,
    },

    /// A threshold's `val` exceeds its `max`.
    #[error("threshold {index}: val ({val}) exceeds max ({max})")]
    ThresholdValAboveMax {
        /// Index of the offending threshold.
        index: usize,
        /// Configured value.
        val: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Adjacent thresholds' min/max ranges overlap.
    #[error("threshold {index} max ({prev_max}) should be less than threshold {next} min ({next_min})")]
    ThresholdRangesOverlap {
        /// Index of the earlier threshold.
        index: usize,
        /// `max` of the earlier threshold.
        prev_max: usize,
        /// Index of the later threshold (`index + 1`).
        next: usize,
        /// `min` of the later threshold.
        next_min: usize,
    },

    /// `degree` (threshold change %) was negative.
    #[error("threshold degree must be >= 0, got {0}")]
    NegativeDegree(f64),

    /// `trigger` (ratio-divergence trigger) was negative.
    #[error("threshold trigger must be >= 0, got {0}")]
    NegativeTrigger(f64),

    /// `ctl_set` received a dotted path it does not understand.
    #[error("invalid ctl_set path: {0}")]
    InvalidCtlPath(String),

    /// `ctl_set` addressed a threshold index out of range.
    #[error("threshold index {index} out of range for {tiers} tiers")]
    ThresholdIndexOutOfRange {
        /// Requested threshold index.
        index: usize,
        /// Number of tiers configured so far.
        tiers: usize,
    },
}

/// Convenience alias for fallible builder operations.
pub type Result<T> = std::result::Result<T, MemtierError>;
