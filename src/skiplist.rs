//! A generic, arena-backed ordered container with single-writer insertion
//! and lock-free concurrent readers.
//!
//! ```text
//! Level 3:  HEAD ──────────────────────────────► 50 ──────────► NIL
//! Level 2:  HEAD ──────────► 20 ────────────────► 50 ──────────► NIL
//! Level 1:  HEAD ──► 10 ──► 20 ────► 35 ────────► 50 ──► 60 ──► NIL
//! Level 0:  HEAD ──► 10 ──► 20 ──► 25 ──► 35 ──► 50 ──► 60 ──► 70 ► NIL
//! ```
//!
//! Level 0 is a complete sorted linked list; every level above it is a
//! sparse shortcut over the level below (a subset of it). A node's height
//! is drawn once at insertion time with probability `1/BRANCHING` per
//! additional level, capped at [`MAX_HEIGHT`].
//!
//! Node memory is owned by an external [`Arena`] passed to every mutating
//! call — the skip list itself never frees a node. See the crate's design
//! notes for why keys are required to be `Copy`: nodes are never dropped,
//! so a `K` with drop glue would leak resources that aren't the arena's.

use std::cell::UnsafeCell;
use std::cmp::Ordering;
use std::mem;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering as AtomicOrdering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::arena::Arena;

/// Maximum number of levels a node may occupy.
pub const MAX_HEIGHT: usize = 12;

/// Denominator of the per-level height-growth probability (`1/BRANCHING`).
pub const BRANCHING: u32 = 4;

/// Fixed RNG seed so height assignment is reproducible across runs.
const HEIGHT_SEED: u64 = 0xDEAD_BEEF;

/// A strict weak ordering over keys, supplied by the caller at construction.
pub trait Comparator<K: ?Sized> {
    /// Returns `Less`/`Equal`/`Greater` for `a` relative to `b`.
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

impl<K: ?Sized, F: Fn(&K, &K) -> Ordering> Comparator<K> for F {
    fn compare(&self, a: &K, b: &K) -> Ordering {
        (self)(a, b)
    }
}

struct Node<K> {
    key: K,
    height: usize,
    levels: NonNull<AtomicPtr<Node<K>>>,
}

impl<K> Node<K> {
    #[inline]
    fn next(&self, level: usize, order: AtomicOrdering) -> *mut Node<K> {
        debug_assert!(level < self.height);
        // SAFETY: `levels` points to a run of `height` initialized `AtomicPtr`
        // slots allocated alongside this node; `level < self.height`.
        unsafe { (*self.levels.as_ptr().add(level)).load(order) }
    }

    #[inline]
    fn set_next(&self, level: usize, node: *mut Node<K>, order: AtomicOrdering) {
        debug_assert!(level < self.height);
        // SAFETY: see `next`.
        unsafe { (*self.levels.as_ptr().add(level)).store(node, order) };
    }
}

/// `prev[level]` during a search: `None` means "the head sentinel",
/// `Some(node)` means the last real node before the target at that level.
type PrevSlot<K> = Option<NonNull<Node<K>>>;

/// An ordered, arena-backed skip list.
///
/// Construction does not take ownership of an [`Arena`]; every call that
/// allocates (`insert`) takes one by reference instead, so the skip list
/// has no opinion on who owns the arena or how long it lives beyond "at
/// least as long as this skip list is used".
pub struct SkipList<K, C> {
    cmp: C,
    head: [AtomicPtr<Node<K>>; MAX_HEIGHT],
    max_height: AtomicUsize,
    len: AtomicUsize,
    /// Mutated only by the single writer thread (see module docs); never
    /// touched by readers.
    rng: UnsafeCell<StdRng>,
}

// SAFETY: every reachable node, once linked via a release store, is only
// ever read through acquire loads; the single-writer contract on `insert`
// (documented on every mutating method) is what makes sharing `&SkipList`
// across threads sound, exactly as the concurrency contract in the design
// notes describes. `rng` is only touched by that same single writer.
unsafe impl<K: Send, C: Send> Send for SkipList<K, C> {}
unsafe impl<K: Send + Sync, C: Sync> Sync for SkipList<K, C> {}

impl<K: Copy, C: Comparator<K>> SkipList<K, C> {
    /// Creates an empty skip list using `cmp` for ordering.
    pub fn new(cmp: C) -> Self {
        Self {
            cmp,
            head: std::array::from_fn(|_| AtomicPtr::new(ptr::null_mut())),
            max_height: AtomicUsize::new(1),
            len: AtomicUsize::new(0),
            rng: UnsafeCell::new(StdRng::seed_from_u64(HEIGHT_SEED)),
        }
    }

    /// Number of entries currently in the list.
    pub fn len(&self) -> usize {
        self.len.load(AtomicOrdering::Relaxed)
    }

    /// Whether the list has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The comparator this list was constructed with.
    pub fn comparator(&self) -> &C {
        &self.cmp
    }

    /// Inserts `key`, allocating its node from `arena`.
    ///
    /// # Preconditions
    ///
    /// No equal key may already be present; violating this is checked by a
    /// debug assertion only (undefined behavior in release builds, per the
    /// crate's error-handling policy for structural misuse). Must not be
    /// called concurrently with another `insert` on the same list.
    pub fn insert(&self, key: K, arena: &Arena) {
        let mut prev: [PrevSlot<K>; MAX_HEIGHT] = [None; MAX_HEIGHT];
        let existing = self.find_greater_or_equal(&key, Some(&mut prev));
        debug_assert!(
            existing.is_null() || self.key_at(existing, |k| self.cmp.compare(k, &key)) != Ordering::Equal,
            "duplicate key inserted into skip list"
        );

        let height = self.random_height();
        let current_max = self.max_height.load(AtomicOrdering::Relaxed);
        if height > current_max {
            // `prev[current_max..height]` is already `None` (head) from the
            // search above, since the search never looked at those levels.
            self.max_height.store(height, AtomicOrdering::Relaxed);
        }

        let node = self.alloc_node(arena, key, height);
        for level in 0..height {
            let next = self.prev_next(prev[level], level, AtomicOrdering::Relaxed);
            // SAFETY: `node` was just allocated and not yet published; no
            // other thread can observe it, so a relaxed store is sufficient.
            unsafe { (*node.as_ptr()).set_next(level, next, AtomicOrdering::Relaxed) };
            self.set_prev_next(prev[level], level, node.as_ptr(), AtomicOrdering::Release);
        }
        self.len.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Returns true iff an entry comparing equal to `key` is present.
    pub fn contains(&self, key: &K) -> bool {
        let node = self.find_greater_or_equal(key, None);
        !node.is_null() && self.key_at(node, |k| self.cmp.compare(k, key)) == Ordering::Equal
    }

    /// Returns the height of the node comparing equal to `key`, if present.
    ///
    /// Exposed for reproducibility testing of the height distribution; not
    /// part of the conceptual model.
    pub fn node_height(&self, key: &K) -> Option<usize> {
        let node = self.find_greater_or_equal(key, None);
        if !node.is_null() && self.key_at(node, |k| self.cmp.compare(k, key)) == Ordering::Equal {
            // SAFETY: `node` is non-null and was found via `find_greater_or_equal`.
            Some(unsafe { (*node).height })
        } else {
            None
        }
    }

    /// Returns a bidirectional iterator positioned before the first entry.
    pub fn iter(&self) -> SkipListIterator<'_, K, C> {
        SkipListIterator {
            list: self,
            current: ptr::null_mut(),
        }
    }

    fn random_height(&self) -> usize {
        // SAFETY: only the single writer ever touches `rng`, enforced by
        // the same external contract that serializes `insert`.
        let rng = unsafe { &mut *self.rng.get() };
        let mut height = 1;
        while height < MAX_HEIGHT && rng.gen_range(0..BRANCHING) == 0 {
            height += 1;
        }
        height
    }

    fn alloc_node(&self, arena: &Arena, key: K, height: usize) -> NonNull<Node<K>> {
        let node_ptr = arena.allocate_aligned(mem::size_of::<Node<K>>()) as *mut Node<K>;
        let levels_ptr =
            arena.allocate_aligned(mem::size_of::<AtomicPtr<Node<K>>>() * height) as *mut AtomicPtr<Node<K>>;
        // SAFETY: both pointers come from a fresh, sufficiently-sized and
        // aligned arena allocation that nothing else aliases yet.
        unsafe {
            for i in 0..height {
                levels_ptr.add(i).write(AtomicPtr::new(ptr::null_mut()));
            }
            node_ptr.write(Node {
                key,
                height,
                levels: NonNull::new_unchecked(levels_ptr),
            });
            NonNull::new_unchecked(node_ptr)
        }
    }

    fn key_at<R>(&self, node: *mut Node<K>, f: impl FnOnce(&K) -> R) -> R {
        debug_assert!(!node.is_null());
        // SAFETY: callers only pass non-null pointers obtained from this
        // list's own search/insert logic, which never frees a node.
        f(unsafe { &(*node).key })
    }

    fn prev_next(&self, prev: PrevSlot<K>, level: usize, order: AtomicOrdering) -> *mut Node<K> {
        match prev {
            None => self.head[level].load(order),
            // SAFETY: `n` is a previously-linked node, immortal for the
            // list's lifetime.
            Some(n) => unsafe { n.as_ref().next(level, order) },
        }
    }

    fn set_prev_next(&self, prev: PrevSlot<K>, level: usize, node: *mut Node<K>, order: AtomicOrdering) {
        match prev {
            None => self.head[level].store(node, order),
            // SAFETY: see `prev_next`.
            Some(n) => unsafe { n.as_ref().set_next(level, node, order) },
        }
    }

    /// Positions at the first node whose key is `>= key`, or null if none.
    /// When `record_prev` is supplied, fills in the predecessor at every
    /// level (the splice points a subsequent `insert` needs).
    fn find_greater_or_equal(
        &self,
        key: &K,
        mut record_prev: Option<&mut [PrevSlot<K>; MAX_HEIGHT]>,
    ) -> *mut Node<K> {
        let mut level = self.max_height.load(AtomicOrdering::Relaxed) - 1;
        let mut prev: PrevSlot<K> = None;
        loop {
            let next = self.prev_next(prev, level, AtomicOrdering::Acquire);
            let advance = !next.is_null() && self.key_at(next, |k| self.cmp.compare(k, key)) == Ordering::Less;
            if advance {
                // SAFETY: `next` is non-null in this branch.
                prev = NonNull::new(next);
            } else {
                if let Some(rp) = record_prev.as_deref_mut() {
                    rp[level] = prev;
                }
                if level == 0 {
                    return next;
                }
                level -= 1;
            }
        }
    }

    /// Positions at the last node whose key is `< key`, or null if none.
    fn find_less_than(&self, key: &K) -> *mut Node<K> {
        let mut level = self.max_height.load(AtomicOrdering::Relaxed) - 1;
        let mut prev: PrevSlot<K> = None;
        loop {
            let next = self.prev_next(prev, level, AtomicOrdering::Acquire);
            let advance = !next.is_null() && self.key_at(next, |k| self.cmp.compare(k, key)) == Ordering::Less;
            if advance {
                prev = NonNull::new(next);
            } else if level == 0 {
                return prev.map_or(ptr::null_mut(), |n| n.as_ptr());
            } else {
                level -= 1;
            }
        }
    }

    /// Positions at the last node in the list, or null if the list is empty.
    fn find_last(&self) -> *mut Node<K> {
        let mut level = self.max_height.load(AtomicOrdering::Relaxed) - 1;
        let mut prev: PrevSlot<K> = None;
        loop {
            let next = self.prev_next(prev, level, AtomicOrdering::Acquire);
            if !next.is_null() {
                prev = NonNull::new(next);
            } else if level == 0 {
                return prev.map_or(ptr::null_mut(), |n| n.as_ptr());
            } else {
                level -= 1;
            }
        }
    }
}

/// A bidirectional iterator over a [`SkipList`]'s entries in comparator
/// order. Holds a borrow on the list; the list's arena must outlive the
/// iterator.
pub struct SkipListIterator<'a, K, C> {
    list: &'a SkipList<K, C>,
    current: *mut Node<K>,
}

impl<'a, K: Copy, C: Comparator<K>> SkipListIterator<'a, K, C> {
    /// Whether the iterator is positioned at an entry.
    pub fn valid(&self) -> bool {
        !self.current.is_null()
    }

    /// The key at the current position.
    ///
    /// # Preconditions
    /// `valid()` must be true; checked by a debug assertion only.
    pub fn key(&self) -> &'a K {
        debug_assert!(self.valid());
        // SAFETY: non-null by precondition; the node is immortal for the
        // list's lifetime and `'a` is tied to the list's borrow.
        unsafe { &(*self.current).key }
    }

    /// Positions at the first entry with key `>= target`.
    pub fn seek(&mut self, target: &K) {
        self.current = self.list.find_greater_or_equal(target, None);
    }

    /// Positions at the first entry, or becomes invalid if the list is empty.
    pub fn seek_to_first(&mut self) {
        self.current = self.list.head[0].load(AtomicOrdering::Acquire);
    }

    /// Positions at the last entry, or becomes invalid if the list is empty.
    pub fn seek_to_last(&mut self) {
        self.current = self.list.find_last();
    }

    /// Advances to the next entry.
    ///
    /// # Preconditions
    /// `valid()` must be true; checked by a debug assertion only.
    pub fn next(&mut self) {
        debug_assert!(self.valid());
        // SAFETY: non-null by precondition.
        self.current = unsafe { (*self.current).next(0, AtomicOrdering::Acquire) };
    }

    /// Moves to the previous entry. Expected O(log n) — no back-pointers
    /// are maintained.
    ///
    /// # Preconditions
    /// `valid()` must be true; checked by a debug assertion only.
    pub fn prev(&mut self) {
        debug_assert!(self.valid());
        let key = self.key();
        self.current = self.list.find_less_than(key);
    }
}
