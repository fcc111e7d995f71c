//! Event wire format pushed from allocator threads to the ranking worker.
//!
//! One-to-one with the original's `EventType`/`struct Event`
//! (`memkind_memtier.c`'s `_post_alloc` pushing `EVENT_CREATE_ADD`, and
//! `ranking.cpp`'s consumers of `EVENT_DESTROY_REMOVE`/`EVENT_REALLOC`/
//! `EVENT_TOUCH`).

/// An informational callback fired by the ranking worker when a touch lands
/// on an address it has been told to watch. Purely observational — it never
/// feeds ranking — and exists so tests can assert that a touch actually
/// reached the worker thread, mirroring the original's debug instrumentation
/// hooks rather than any production code path.
pub type TouchCallback = fn(cb_arg: usize);

/// A single notification produced by an allocating thread and consumed by
/// the ranking worker.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Event {
    /// A new allocation was created at `addr`, attributed to `fingerprint`,
    /// with live `size` bytes.
    CreateAdd {
        fingerprint: u64,
        addr: usize,
        size: usize,
    },
    /// The allocation previously registered at `addr` was freed.
    DestroyRemove { addr: usize },
    /// The allocation at `old_addr` moved to `new_addr` (or grew/shrank in
    /// place, in which case `old_addr == new_addr`), now `new_size` bytes.
    Realloc {
        old_addr: usize,
        new_addr: usize,
        new_size: usize,
        fingerprint: u64,
    },
    /// The object at `addr` was touched (read or written) by user code.
    Touch { addr: usize },
    /// Installs `cb` to be invoked with `cb_arg` on every subsequent
    /// `Touch` delivered for `addr`, replacing any callback previously
    /// registered for that address.
    SetTouchCallback {
        addr: usize,
        cb: TouchCallback,
        cb_arg: usize,
    },
}
