//! The `Kind` collaborator: a backing memory region the façade allocates
//! against.
//!
//! Page-granular kind implementations (mapping pages to
//! NUMA nodes or devices) are out of scope for this crate; it only consumes
//! a narrow trait. Production callers implement [`Kind`] over whatever
//! backing allocator they have (a NUMA-bound arena, a `memkind`-style
//! persistent-memory pool, a remote-memory RDMA region, ...). Tests in this
//! crate implement it over the system allocator.

use std::fmt::Debug;

/// A stable small integer naming a kind's slot in accounting arrays.
pub type Partition = u16;

/// A named backing memory region.
///
/// Kinds are created and owned by an external collaborator; this crate only
/// references them through this trait. A `Kind` must be stable for the
/// process lifetime.
pub trait Kind: Debug + Send + Sync {
    /// Stable small integer index into accounting arrays.
    fn partition(&self) -> Partition;

    /// Human-readable name, used in diagnostics.
    fn name(&self) -> &str;

    /// Whether this kind is the "fast" tier for the data-hotness policy.
    ///
    /// Grounded on `builder_hot_create_memory`'s `MEMKIND_DEFAULT`-detection
    /// rule: the original infers the fast tier from a well-known kind
    /// constant; we make the caller state it explicitly.
    fn is_fast(&self) -> bool {
        false
    }

    /// Allocates `size` bytes from this kind.
    ///
    /// # Safety
    /// The returned pointer, if non-null, must be suitable to pass to
    /// [`Kind::free`] and [`Kind::usable_size`] on this same kind.
    unsafe fn malloc(&self, size: usize) -> *mut u8;

    /// Allocates zeroed storage for `num` elements of `size` bytes each.
    ///
    /// # Safety
    /// Same requirements as [`Kind::malloc`].
    unsafe fn calloc(&self, num: usize, size: usize) -> *mut u8;

    /// Resizes a previous allocation from this kind.
    ///
    /// # Safety
    /// `ptr` must be null or a pointer previously returned by this kind.
    unsafe fn realloc(&self, ptr: *mut u8, size: usize) -> *mut u8;

    /// Allocates `size` bytes aligned to `align`.
    ///
    /// # Safety
    /// Same requirements as [`Kind::malloc`]; `align` must be a power of two.
    unsafe fn posix_memalign(&self, align: usize, size: usize) -> *mut u8;

    /// Frees a pointer previously returned by this kind.
    ///
    /// # Safety
    /// `ptr` must be null or a pointer previously returned by this kind and
    /// not yet freed.
    unsafe fn free(&self, ptr: *mut u8);

    /// Reports the real allocated size backing `ptr` (may exceed the
    /// requested size due to allocator rounding).
    ///
    /// # Safety
    /// `ptr` must be a live pointer previously returned by this kind.
    unsafe fn usable_size(&self, ptr: *mut u8) -> usize;
}

/// Hook invoked by [`crate::facade::Facade`] around allocation and free
/// operations.
///
/// This is the idiomatic replacement for the original's weak-symbol
/// allocator decorators (`memtier_kind_malloc_post`, `memtier_kind_free_pre`,
/// ...): Rust has no portable weak-symbol mechanism worth reaching for, so
/// callers register a trait object instead.
pub trait AllocHook: Send + Sync {
    /// Called after a successful allocating call, with the real size
    /// reported by [`Kind::usable_size`].
    fn post_alloc(&self, _partition: Partition, _addr: *mut u8, _size: usize) {}

    /// Called before a `free` is forwarded to the underlying kind.
    fn pre_free(&self, _partition: Partition, _addr: *mut u8) {}
}
