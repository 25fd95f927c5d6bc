//! Bump-style allocator backing both the skip list's nodes and the
//! memtable's encoded records.
//!
//! All memory handed out by an `Arena` lives until the `Arena` itself is
//! dropped — there is no per-allocation free. Mutation (`allocate`,
//! `allocate_aligned`) is only ever safe from the single writer thread;
//! `memory_usage` is safe to call concurrently with that writer from any
//! number of reader threads.

use std::alloc::{Layout, alloc, dealloc, handle_alloc_error};
use std::cell::UnsafeCell;
use std::mem;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::DEFAULT_ARENA_BLOCK_SIZE;

/// Blocks smaller than this fraction of `block_size` share the arena's
/// current block; anything larger gets a dedicated block so it doesn't
/// strand the remainder of a shared block.
const DEDICATED_BLOCK_THRESHOLD: usize = 4;

struct ArenaState {
    blocks: Vec<(NonNull<u8>, Layout)>,
    ptr: *mut u8,
    bytes_remaining: usize,
}

/// A bump allocator whose backing blocks are never relocated or freed
/// individually.
///
/// # Safety contract
///
/// `allocate` and `allocate_aligned` must be called by a single writer at a
/// time (the same discipline the skip list and memtable impose on `insert`/
/// `add`). `memory_usage` may be called concurrently with that writer from
/// any thread.
pub struct Arena {
    block_size: usize,
    state: UnsafeCell<ArenaState>,
    memory_usage: AtomicUsize,
}

// SAFETY: `Arena` is shared across reader threads that only ever call
// `memory_usage` (an atomic load); all mutation through `state` is gated by
// the single-writer contract documented on the type, mirroring the
// skip list's own `unsafe impl Sync`.
unsafe impl Sync for Arena {}
unsafe impl Send for Arena {}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl Arena {
    /// Creates an arena with the default block size.
    pub fn new() -> Self {
        Self::with_block_size(DEFAULT_ARENA_BLOCK_SIZE)
    }

    /// Creates an arena whose shared blocks are `block_size` bytes.
    pub fn with_block_size(block_size: usize) -> Self {
        assert!(block_size > 0, "arena block size must be nonzero");
        Self {
            block_size,
            state: UnsafeCell::new(ArenaState {
                blocks: Vec::new(),
                ptr: std::ptr::null_mut(),
                bytes_remaining: 0,
            }),
            memory_usage: AtomicUsize::new(mem::size_of::<Self>()),
        }
    }

    /// Returns a pointer to `n` contiguous uninitialized bytes.
    ///
    /// Caller must never request `n == 0`; checked only in debug builds,
    /// per the arena's precondition contract.
    pub fn allocate(&self, n: usize) -> *mut u8 {
        debug_assert_ne!(n, 0, "arena allocation size must be nonzero");
        // SAFETY: single-writer contract (see type docs).
        let state = unsafe { &mut *self.state.get() };
        if n <= state.bytes_remaining {
            let result = state.ptr;
            // SAFETY: `n <= bytes_remaining` guarantees this stays within the block.
            state.ptr = unsafe { state.ptr.add(n) };
            state.bytes_remaining -= n;
            result
        } else {
            self.allocate_fallback(state, n)
        }
    }

    /// Returns a pointer to `n` contiguous bytes aligned to at least
    /// `size_of::<usize>()` — sufficient for an array of `AtomicPtr`.
    pub fn allocate_aligned(&self, n: usize) -> *mut u8 {
        debug_assert_ne!(n, 0, "arena allocation size must be nonzero");
        let align = mem::size_of::<usize>();
        // SAFETY: single-writer contract (see type docs).
        let state = unsafe { &mut *self.state.get() };
        let slop = {
            let misalignment = (state.ptr as usize) & (align - 1);
            if misalignment == 0 { 0 } else { align - misalignment }
        };
        let needed = n + slop;
        if needed <= state.bytes_remaining {
            // SAFETY: `needed <= bytes_remaining` guarantees this stays within the block.
            let result = unsafe { state.ptr.add(slop) };
            state.ptr = unsafe { state.ptr.add(needed) };
            state.bytes_remaining -= needed;
            debug_assert_eq!(result as usize & (align - 1), 0);
            result
        } else {
            // Fresh blocks are always allocated with `align`-aligned layout,
            // so the fallback path never needs extra slop.
            self.allocate_fallback(state, n)
        }
    }

    /// Upper-bound estimate of all bytes ever handed out plus bookkeeping
    /// overhead. Safe to call concurrently with `allocate`/`allocate_aligned`;
    /// may lag a concurrent writer by one allocation.
    pub fn memory_usage(&self) -> usize {
        self.memory_usage.load(Ordering::Relaxed)
    }

    fn allocate_fallback(&self, state: &mut ArenaState, n: usize) -> *mut u8 {
        if n > self.block_size / DEDICATED_BLOCK_THRESHOLD {
            // Oversized request: give it its own block so it doesn't evict
            // the remaining capacity of the current shared block.
            return self.allocate_new_block(state, n);
        }
        let block_ptr = self.allocate_new_block(state, self.block_size);
        // SAFETY: `n <= self.block_size` in this branch.
        state.ptr = unsafe { block_ptr.add(n) };
        state.bytes_remaining = self.block_size - n;
        block_ptr
    }

    fn allocate_new_block(&self, state: &mut ArenaState, block_bytes: usize) -> *mut u8 {
        let align = mem::size_of::<usize>();
        let layout = Layout::from_size_align(block_bytes, align).expect("valid arena block layout");
        // SAFETY: `layout.size() > 0` since callers never request a zero-size block.
        let raw = unsafe { alloc(layout) };
        let Some(non_null) = NonNull::new(raw) else {
            handle_alloc_error(layout);
        };
        state.blocks.push((non_null, layout));
        self.memory_usage.fetch_add(
            block_bytes + mem::size_of::<(NonNull<u8>, Layout)>(),
            Ordering::Relaxed,
        );
        raw
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for (ptr, layout) in state.blocks.drain(..) {
            // SAFETY: each `(ptr, layout)` pair came from a matching `alloc`
            // call above and is only ever freed once, here.
            unsafe { dealloc(ptr.as_ptr(), layout) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_arena_has_nonzero_bookkeeping_usage() {
        let arena = Arena::new();
        assert!(arena.memory_usage() > 0);
    }

    #[test]
    fn allocate_returns_distinct_writable_regions() {
        let arena = Arena::new();
        let a = arena.allocate(16);
        let b = arena.allocate(16);
        assert_ne!(a, b);
        unsafe {
            for i in 0..16 {
                *a.add(i) = 0xAA;
                *b.add(i) = 0xBB;
            }
            for i in 0..16 {
                assert_eq!(*a.add(i), 0xAA);
                assert_eq!(*b.add(i), 0xBB);
            }
        }
    }

    #[test]
    fn allocate_aligned_is_pointer_aligned() {
        let arena = Arena::new();
        for size in [1usize, 3, 7, 8, 64, 4096] {
            let p = arena.allocate_aligned(size);
            assert_eq!(p as usize % mem::size_of::<usize>(), 0);
        }
    }

    #[test]
    fn memory_usage_grows_monotonically() {
        let arena = Arena::new();
        let mut last = arena.memory_usage();
        for _ in 0..200 {
            arena.allocate(32);
            let next = arena.memory_usage();
            assert!(next >= last);
            last = next;
        }
    }

    #[test]
    fn oversized_allocation_gets_dedicated_block() {
        let arena = Arena::with_block_size(256);
        let usage_before = arena.memory_usage();
        // Bigger than block_size / 4, should not perturb the shared block.
        let big = arena.allocate(1024);
        assert!(!big.is_null());
        let usage_after = arena.memory_usage();
        assert!(usage_after - usage_before >= 1024);

        // The shared block is still fresh, so a small allocation afterward
        // should still fit into a brand new (or the still-empty) block.
        let small = arena.allocate(8);
        assert!(!small.is_null());
    }

    #[test]
    fn many_small_allocations_span_multiple_blocks() {
        let arena = Arena::with_block_size(64);
        let mut pointers = Vec::new();
        for _ in 0..100 {
            pointers.push(arena.allocate(16));
        }
        let unique: std::collections::HashSet<_> = pointers.iter().map(|p| *p as usize).collect();
        assert_eq!(unique.len(), pointers.len());
    }
}
