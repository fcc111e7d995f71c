//! Call-site fingerprinting.
//!
//! Hotness is tracked per call-site *type*, not per object: two allocations
//! made from the same code path share one ranking entry. A fingerprint is a
//! stable 64-bit hash of a short prefix of the call stack (skipping this
//! crate's own frames) folded together with the requested size, so that two
//! different sizes requested from the same call site still land on
//! distinguishable-but-related fingerprints, matching the original's
//! `get_fingerprint` (stack walk via `libunwind`, size mixed into the hash).
//!
//! Stack walking uses the `backtrace` crate, the ecosystem's standard
//! choice for this (see `Timwood0x10-memscope-rs`'s `enhanced-tracking`
//! feature in the retrieval pack, which walks call stacks the same way for
//! allocation tracking). Without the `backtrace` feature this falls back to
//! hashing only the size and a caller-supplied site tag — a degraded mode
//! documented as such, not a silent approximation.

use std::cell::Cell;

/// Number of stack frames folded into the hash, beyond the skipped prefix.
const FRAME_DEPTH: usize = 8;

/// Frames to skip from the top of the stack: this function's own frame and
/// the small number of wrapper frames the façade typically adds before
/// reaching the caller's real call site.
const SKIP_FRAMES: usize = 2;

thread_local! {
    /// Cached raw stack-bottom bound for this thread (the address nearest
    /// the thread's entry point), computed once via `initialize_stack_bottom`
    /// in the original. This is the only part of the walk that is truly
    /// invariant per thread; the frames between the caller and this bound
    /// change on every call and must be walked fresh each time.
    static STACK_BOTTOM: Cell<Option<u64>> = Cell::new(None);
}

fn stack_bottom() -> u64 {
    STACK_BOTTOM.with(|cell| {
        if let Some(v) = cell.get() {
            return v;
        }
        let v = deepest_frame_ip();
        cell.set(Some(v));
        v
    })
}

#[cfg(feature = "backtrace")]
fn deepest_frame_ip() -> u64 {
    let mut last = 0u64;
    backtrace::trace(|frame| {
        last = frame.ip() as usize as u64;
        true
    });
    last
}

#[cfg(not(feature = "backtrace"))]
fn deepest_frame_ip() -> u64 {
    0
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e3779b97f4a7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}

#[inline]
fn fold(acc: u64, frame_ip: u64) -> u64 {
    splitmix64(acc ^ frame_ip)
}

#[cfg(feature = "backtrace")]
fn walk_and_fold() -> u64 {
    let bottom = stack_bottom();
    let mut acc = 0xcbf29ce484222325u64; // FNV offset basis, arbitrary seed
    let mut index = 0usize;
    backtrace::trace(|frame| {
        index += 1;
        if index <= SKIP_FRAMES {
            return true;
        }
        let ip = frame.ip() as usize as u64;
        acc = fold(acc, ip);
        // Stop at the cached stack-bottom frame as well as the depth cap:
        // deeper frames are this thread's fixed entry-point chain and add
        // nothing to call-site discrimination.
        ip != bottom && index - SKIP_FRAMES < FRAME_DEPTH
    });
    acc
}

#[cfg(not(feature = "backtrace"))]
fn walk_and_fold() -> u64 {
    // Degraded fallback: no stack walk available, so every call site
    // collapses onto the same base fold. Callers relying on per-site
    // hotness tracking without the `backtrace` feature get one shared
    // bucket instead of real site discrimination.
    let _ = stack_bottom();
    0xcbf29ce484222325u64
}

/// Computes a stable fingerprint for the current call site and `size`.
///
/// The call stack is walked fresh on every invocation — only the thread's
/// stack-bottom bound is cached — so two calls from different call sites on
/// the same thread still fingerprint distinctly after the first call.
/// Same call site + same size class should repeatedly fingerprint to the
/// same value across the process lifetime (modulo ASLR rebasing, which the
/// original also does not defend against).
pub fn fingerprint(size: usize) -> u64 {
    let base = walk_and_fold();
    splitmix64(base ^ (size as u64).wrapping_mul(0x9e3779b97f4a7c15))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_site_same_size_is_stable() {
        let a = fingerprint(128);
        let b = fingerprint(128);
        assert_eq!(a, b);
    }

    #[test]
    fn different_sizes_usually_differ() {
        let a = fingerprint(128);
        let b = fingerprint(256);
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_is_nonzero() {
        assert_ne!(fingerprint(1), 0);
    }
}
