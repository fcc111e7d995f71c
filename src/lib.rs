//! # memtier — tiered-memory allocator front-end
//!
//! Places allocations across multiple backing memory "kinds" (tiers —
//! think a fast DRAM-like pool and a slower PMEM/CXL-like pool) according
//! to a configurable placement policy, while keeping per-tier live-byte
//! accounting cheap enough to sit on the allocation fast path of a
//! multi-threaded program.
//!
//! ## The problem
//!
//! A process with more than one kind of backing memory (fast and
//! near-DRAM-speed vs. slower and larger) wants "hot" data pinned to the
//! fast tier and "cold" data pushed to the slower one, without every
//! caller having to reason about which tier to use by hand. Tracking how
//! full each tier is, and how hot each allocation's call site has been,
//! both need to happen on every `malloc`/`free` without becoming the
//! bottleneck themselves.
//!
//! ## The design
//!
//! - [`accountant`] — a 256-way sharded, thread-hashed live-byte counter
//!   per tier (same cache-line-bouncing fix a single sharded atomic
//!   counter gives you, generalized to a write-combining flush into a
//!   global total instead of summing every shard on every read).
//! - [`wre_tree`] — a weight-ranked AVL tree answering "which key holds
//!   the Nth percentile of total weight" in `O(log n)`, the core of
//!   hotness-threshold computation.
//! - [`fingerprint`] — stable per-call-site hashing, so hotness is
//!   tracked per code path rather than per object.
//! - [`ranking`] — aggregates `(hotness, size)` per call site and
//!   computes the hot/cold threshold for a target byte ratio.
//! - [`queue`] and [`events`] — a lock-free bounded single-reader/
//!   multi-writer ring buffer carrying allocation lifecycle notifications
//!   from allocator threads to...
//! - [`worker`] — a dedicated background thread that drains the queue and
//!   keeps [`ranking`] up to date.
//! - [`policy`] — the three placement strategies: static ratio, dynamic
//!   size threshold, and data hotness.
//! - [`builder`] and [`memory`] — a mutable [`builder::Builder`] validates
//!   a configuration and freezes it into an immutable
//!   [`memory::MemoryHandle`].
//! - `facade.rs` (no public module, methods live directly on
//!   [`memory::MemoryHandle`]) — the `malloc`/`calloc`/`realloc`/
//!   `posix_memalign`/`free`/`usable_size` entry points every allocation
//!   actually goes through.
//!
//! ## Quick start
//!
//! ```
//! use std::alloc::Layout;
//! use std::collections::HashMap;
//! use std::sync::{Arc, Mutex};
//! use memtier::builder::{Builder, PolicyKind};
//! use memtier::config::Defaults;
//! use memtier::kind::{Kind, Partition};
//!
//! #[derive(Debug)]
//! struct SystemKind {
//!     partition: Partition,
//!     layouts: Mutex<HashMap<usize, Layout>>,
//! }
//!
//! impl Kind for SystemKind {
//!     fn partition(&self) -> Partition { self.partition }
//!     fn name(&self) -> &str { "system" }
//!     unsafe fn malloc(&self, size: usize) -> *mut u8 {
//!         let layout = Layout::from_size_align(size.max(1), 8).unwrap();
//!         let ptr = std::alloc::alloc(layout);
//!         if !ptr.is_null() {
//!             self.layouts.lock().unwrap().insert(ptr as usize, layout);
//!         }
//!         ptr
//!     }
//!     unsafe fn calloc(&self, num: usize, size: usize) -> *mut u8 { self.malloc(num * size) }
//!     unsafe fn realloc(&self, ptr: *mut u8, size: usize) -> *mut u8 {
//!         self.free(ptr);
//!         self.malloc(size)
//!     }
//!     unsafe fn posix_memalign(&self, _align: usize, size: usize) -> *mut u8 { self.malloc(size) }
//!     unsafe fn free(&self, ptr: *mut u8) {
//!         if let Some(layout) = self.layouts.lock().unwrap().remove(&(ptr as usize)) {
//!             std::alloc::dealloc(ptr, layout);
//!         }
//!     }
//!     unsafe fn usable_size(&self, ptr: *mut u8) -> usize {
//!         self.layouts.lock().unwrap().get(&(ptr as usize)).map(|l| l.size()).unwrap_or(0)
//!     }
//! }
//!
//! let mut builder = Builder::new(PolicyKind::StaticRatio, Defaults::default());
//! builder.add_tier(Arc::new(SystemKind { partition: 0, layouts: Mutex::new(HashMap::new()) }), 1.0).unwrap();
//! let memory = builder.construct().unwrap();
//!
//! let ptr = memory.malloc(128);
//! assert_eq!(memory.live_bytes(0), 128);
//! memory.free(ptr);
//! ```
//!
//! ## Thread safety
//!
//! [`memory::MemoryHandle`] is `Send + Sync` and meant to be shared (e.g.
//! behind an `Arc`) across every thread performing allocations; every
//! method it exposes takes `&self`.

pub mod accountant;
pub mod builder;
pub mod config;
pub mod error;
mod facade;
pub mod events;
pub mod fingerprint;
pub mod kind;
pub mod memory;
pub mod policy;
pub mod queue;
pub mod ranking;
pub mod worker;
pub mod wre_tree;
