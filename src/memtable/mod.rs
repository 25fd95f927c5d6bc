//! In-memory, ordered, append-mostly buffer of recent writes.
//!
//! A [`MemTable`] wraps one [`SkipList`] whose key is a raw pointer into its
//! own [`Arena`], pointing at an encoded record. Insertion (`add`) encodes
//! one contiguous record and links it in; lookup (`get`) seeks to the
//! newest version of a user key and inspects its tag. Lifetime is managed
//! by a manual reference count rather than the borrow checker or `Arc`,
//! since the count must start at zero with the first reference left to the
//! caller — something `Arc::new` cannot express.

pub mod internal_key;
pub mod varint;

use std::cmp::Ordering;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use crate::arena::Arena;
use crate::config::MemTableOptions;
use crate::error::{Error, Result};
use crate::skiplist::{Comparator, SkipList, SkipListIterator};
use crate::types::{SequenceNumber, ValueType, pack_tag, unpack_tag};

pub use internal_key::{BytewiseComparator, InternalKeyComparator, LookupKey, UserComparator};
use varint::put_varint32;

/// A raw, arena-owned pointer to the start of one encoded record.
///
/// `Copy` and otherwise opaque: the skip list never reads through it
/// itself, only the memtable's own comparator and decoders do.
#[derive(Clone, Copy, PartialEq, Eq)]
struct EntryPtr(*const u8);

// SAFETY: an `EntryPtr` is only ever dereferenced through the single-writer
// / many-reader discipline the memtable and its skip list already impose;
// see the arena and skip list's own `unsafe impl Send/Sync` for the same
// argument.
unsafe impl Send for EntryPtr {}
unsafe impl Sync for EntryPtr {}

/// Adapts an [`InternalKeyComparator`] to compare the arena-backed entries
/// the skip list actually stores (pointers), not byte slices directly.
struct MemtableComparator<U> {
    icmp: InternalKeyComparator<U>,
}

impl<U: UserComparator> Comparator<EntryPtr> for MemtableComparator<U> {
    fn compare(&self, a: &EntryPtr, b: &EntryPtr) -> Ordering {
        // SAFETY: both pointers were produced either by `MemTable::add`
        // (a fully-written record) or by a `LookupKey`'s own buffer (a
        // well-formed `varint32(len) || user_key || tag`, no trailing
        // value to read) — either way `decode_internal_key_only` never
        // reads past the bytes it decodes.
        let a_ikey = unsafe { decode_internal_key_only(a.0) };
        let b_ikey = unsafe { decode_internal_key_only(b.0) };
        self.icmp.compare(a_ikey, b_ikey)
    }
}

/// Reads a `varint32` directly from a raw pointer, advancing past it.
///
/// Unlike [`varint::get_varint32`] this never pre-slices a fixed window: it
/// stops at the first byte with a clear high bit, so it never reads past
/// the bytes the varint actually occupies — required here since the
/// pointer may address the tail of an exactly-sized arena allocation.
unsafe fn read_varint32(ptr: *const u8) -> (u32, *const u8) {
    let mut result: u32 = 0;
    let mut shift = 0;
    let mut p = ptr;
    loop {
        // SAFETY: caller guarantees `ptr` addresses a well-formed varint32.
        let byte = unsafe { *p };
        p = unsafe { p.add(1) };
        result |= u32::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return (result, p);
        }
        shift += 7;
    }
}

/// Decodes just the length-prefixed internal key (`user_key || tag`) at
/// `ptr`, ignoring anything that may follow.
///
/// # Safety
/// `ptr` must address a `varint32(internal_key_size) || internal_key_size`
/// bytes of readable memory (a full record, or a [`LookupKey`]'s buffer).
unsafe fn decode_internal_key_only<'a>(ptr: *const u8) -> &'a [u8] {
    let (len, p) = unsafe { read_varint32(ptr) };
    // SAFETY: see function docs.
    unsafe { std::slice::from_raw_parts(p, len as usize) }
}

/// A fully decoded record: its internal key and its value.
struct DecodedEntry<'a> {
    internal_key: &'a [u8],
    value: &'a [u8],
}

/// Decodes a full record at `ptr`: internal key then value.
///
/// # Safety
/// `ptr` must address a complete record written by [`MemTable::add`].
unsafe fn decode_entry<'a>(ptr: *const u8) -> DecodedEntry<'a> {
    let (ikey_len, p) = unsafe { read_varint32(ptr) };
    // SAFETY: see function docs.
    let internal_key = unsafe { std::slice::from_raw_parts(p, ikey_len as usize) };
    let p = unsafe { p.add(ikey_len as usize) };
    let (value_len, p) = unsafe { read_varint32(p) };
    // SAFETY: see function docs.
    let value = unsafe { std::slice::from_raw_parts(p, value_len as usize) };
    DecodedEntry { internal_key, value }
}

/// The outcome of a [`MemTable::get`]: a value, a definite tombstone, or a
/// miss, kept distinct so callers never conflate "absent" with "deleted".
#[derive(Debug, PartialEq, Eq)]
pub enum LookupResult<'a> {
    /// No entry for this user key exists in the memtable.
    NotFound,
    /// The newest entry for this user key is a normal value.
    Found(&'a [u8]),
    /// The newest entry for this user key is a tombstone.
    Deleted,
}

struct Inner<U: UserComparator> {
    arena: Arena,
    list: SkipList<EntryPtr, MemtableComparator<U>>,
    refcount: AtomicUsize,
    options: MemTableOptions,
}

/// An in-memory, ordered write buffer keyed on `(user_key, sequence)`.
///
/// Reference-counted manually: `MemTable::new` starts the count at zero,
/// and the creator must call [`MemTable::ref_`] before any other use.
/// [`MemTable::share`] hands out another handle to the same underlying
/// storage without bumping the count — callers that want an independent
/// owner (an iterator outliving the original scope, a second lookup
/// session) must `ref_()` it themselves.
pub struct MemTable<U: UserComparator = BytewiseComparator> {
    inner: NonNull<Inner<U>>,
    _marker: PhantomData<Inner<U>>,
}

// SAFETY: `Inner<U>` is `Send + Sync` whenever `U` is (every field it owns
// already is — see `Arena`'s and `SkipList`'s own unsafe impls); the only
// reason `MemTable` itself needs a manual impl is that `NonNull` is neither
// by default.
unsafe impl<U: UserComparator + Send + Sync> Send for MemTable<U> {}
unsafe impl<U: UserComparator + Send + Sync> Sync for MemTable<U> {}

impl MemTable<BytewiseComparator> {
    /// Creates a memtable ordered by the default [`BytewiseComparator`].
    pub fn new() -> Self {
        Self::with_comparator(BytewiseComparator)
    }

    /// Creates a memtable ordered by the default [`BytewiseComparator`],
    /// sized according to `options`.
    pub fn with_options(options: MemTableOptions) -> Self {
        Self::with_comparator_and_options(BytewiseComparator, options)
    }
}

impl Default for MemTable<BytewiseComparator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U: UserComparator> MemTable<U> {
    /// Creates a memtable ordered by `user_cmp`, with default [`MemTableOptions`].
    /// The reference count starts at zero — call [`ref_`](Self::ref_) before
    /// any other use.
    pub fn with_comparator(user_cmp: U) -> Self {
        Self::with_comparator_and_options(user_cmp, MemTableOptions::default())
    }

    /// Creates a memtable ordered by `user_cmp`, sizing its arena's shared
    /// blocks and `is_full` budget from `options`. The reference count
    /// starts at zero — call [`ref_`](Self::ref_) before any other use.
    pub fn with_comparator_and_options(user_cmp: U, options: MemTableOptions) -> Self {
        let icmp = InternalKeyComparator::new(user_cmp);
        let inner = Box::new(Inner {
            arena: Arena::with_block_size(options.arena_block_size),
            list: SkipList::new(MemtableComparator { icmp }),
            refcount: AtomicUsize::new(0),
            options,
        });
        Self {
            // SAFETY: `Box::into_raw` never returns null.
            inner: unsafe { NonNull::new_unchecked(Box::into_raw(inner)) },
            _marker: PhantomData,
        }
    }

    fn inner(&self) -> &Inner<U> {
        // SAFETY: valid as long as the refcount this handle participates in
        // hasn't reached zero; upholding that is the caller's responsibility.
        unsafe { self.inner.as_ref() }
    }

    /// Hands out another handle to the same underlying storage, without
    /// incrementing the reference count. The caller must `ref_()` it if it
    /// is to be used as an independent owner (see the type's docs).
    pub fn share(&self) -> Self {
        Self {
            inner: self.inner,
            _marker: PhantomData,
        }
    }

    /// Increments the reference count.
    pub fn ref_(&self) {
        self.inner().refcount.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Decrements the reference count; destroys the memtable (and its
    /// arena, and therefore every record ever added to it) if it reaches
    /// zero.
    pub fn unref(&self) {
        let inner = self.inner();
        let prev = inner.refcount.fetch_sub(1, AtomicOrdering::AcqRel);
        debug_assert!(prev > 0, "unref of a memtable with no outstanding references");
        if prev == 1 {
            // SAFETY: the count just reached zero; no other live handle can
            // observe a positive count after this point, so this is the
            // single deallocating `unref` for this `Inner`.
            unsafe { drop(Box::from_raw(self.inner.as_ptr())) };
        }
    }

    /// Encodes `(sequence, value_type, user_key, value)` into one
    /// contiguous record and links it into the skip list.
    ///
    /// Must not be called concurrently with another `add`, `ref_`, or
    /// `unref` on a handle sharing this storage (single writer); may run
    /// concurrently with any number of `get`/iterator readers.
    pub fn add(&self, sequence: SequenceNumber, value_type: ValueType, user_key: &[u8], value: &[u8]) {
        let inner = self.inner();
        let internal_key_size = user_key.len() + 8;
        let mut ikey_len_buf = Vec::with_capacity(5);
        put_varint32(&mut ikey_len_buf, internal_key_size as u32);
        let mut value_len_buf = Vec::with_capacity(5);
        put_varint32(&mut value_len_buf, value.len() as u32);
        let encoded_len = ikey_len_buf.len() + internal_key_size + value_len_buf.len() + value.len();

        let base = inner.arena.allocate(encoded_len);
        // SAFETY: `base` addresses `encoded_len` freshly allocated bytes
        // exclusively owned by this call (the single writer); each `copy`
        // below stays within that span.
        unsafe {
            let mut p = base;
            ptr::copy_nonoverlapping(ikey_len_buf.as_ptr(), p, ikey_len_buf.len());
            p = p.add(ikey_len_buf.len());
            ptr::copy_nonoverlapping(user_key.as_ptr(), p, user_key.len());
            p = p.add(user_key.len());
            let tag = pack_tag(sequence, value_type).to_le_bytes();
            ptr::copy_nonoverlapping(tag.as_ptr(), p, tag.len());
            p = p.add(tag.len());
            ptr::copy_nonoverlapping(value_len_buf.as_ptr(), p, value_len_buf.len());
            p = p.add(value_len_buf.len());
            ptr::copy_nonoverlapping(value.as_ptr(), p, value.len());
        }

        inner.list.insert(EntryPtr(base as *const u8), &inner.arena);
        log::trace!(
            "memtable add: seq={sequence} type={value_type:?} key_len={} value_len={}",
            user_key.len(),
            value.len()
        );
    }

    /// Looks up the newest entry for `lookup_key`'s user key at or before
    /// its sequence number.
    pub fn get(&self, lookup_key: &LookupKey) -> Result<LookupResult<'_>> {
        let inner = self.inner();
        let target = EntryPtr(lookup_key.memtable_key().as_ptr());
        let mut iter = inner.list.iter();
        iter.seek(&target);
        if !iter.valid() {
            return Ok(LookupResult::NotFound);
        }

        // SAFETY: the node's key is an `EntryPtr` produced by a prior
        // `add` on this same memtable, so it addresses a complete record.
        let decoded = unsafe { decode_entry(iter.key().0) };
        let candidate_user_key = &decoded.internal_key[..decoded.internal_key.len() - 8];
        let user_cmp = inner.list.comparator().icmp.user_comparator();
        if user_cmp.compare(candidate_user_key, lookup_key.user_key()) != Ordering::Equal {
            return Ok(LookupResult::NotFound);
        }

        let tag_bytes = &decoded.internal_key[decoded.internal_key.len() - 8..];
        let tag = u64::from_le_bytes(tag_bytes.try_into().unwrap());
        let (_, type_byte) = unpack_tag(tag);
        match ValueType::from_u8(type_byte) {
            Some(ValueType::Value) => Ok(LookupResult::Found(decoded.value)),
            Some(ValueType::Deletion) => Ok(LookupResult::Deleted),
            None => {
                log::warn!("memtable get: corrupted tag byte {type_byte} for a replayed record");
                Err(Error::Corruption(format!("unknown value-type byte {type_byte}")))
            }
        }
    }

    /// Returns a forward/bidirectional iterator over encoded records in
    /// key order (internal key order, i.e. user key ascending, sequence
    /// descending).
    pub fn new_iterator(&self) -> MemtableIterator<'_, U> {
        MemtableIterator {
            inner: self.inner().list.iter(),
        }
    }

    /// Upper-bound estimate of the bytes this memtable has allocated.
    /// Monotonically non-decreasing for the memtable's lifetime.
    pub fn approximate_memory_usage(&self) -> usize {
        self.inner().arena.memory_usage()
    }

    /// Whether this memtable has grown past its configured byte budget
    /// ([`MemTableOptions::memtable_size`]) and should be swapped for a new
    /// one by the caller — the core has no opinion on what happens next.
    pub fn is_full(&self) -> bool {
        self.approximate_memory_usage() >= self.inner().options.memtable_size
    }
}

/// Iterates a [`MemTable`]'s records in internal-key order, decoding each
/// record's internal key and value on demand.
pub struct MemtableIterator<'a, U: UserComparator> {
    inner: SkipListIterator<'a, EntryPtr, MemtableComparator<U>>,
}

impl<'a, U: UserComparator> MemtableIterator<'a, U> {
    /// Whether the iterator is positioned at an entry.
    pub fn valid(&self) -> bool {
        self.inner.valid()
    }

    /// Positions at the first entry with internal key `>= lookup_key`.
    pub fn seek(&mut self, lookup_key: &LookupKey) {
        let target = EntryPtr(lookup_key.memtable_key().as_ptr());
        self.inner.seek(&target);
    }

    /// Positions at the first entry, or becomes invalid if empty.
    pub fn seek_to_first(&mut self) {
        self.inner.seek_to_first();
    }

    /// Positions at the last entry, or becomes invalid if empty.
    pub fn seek_to_last(&mut self) {
        self.inner.seek_to_last();
    }

    /// Advances to the next entry.
    ///
    /// # Preconditions
    /// `valid()` must be true.
    pub fn next(&mut self) {
        self.inner.next();
    }

    /// Moves to the previous entry.
    ///
    /// # Preconditions
    /// `valid()` must be true.
    pub fn prev(&mut self) {
        self.inner.prev();
    }

    /// The current entry's internal key (`user_key || 8-byte tag`).
    ///
    /// # Preconditions
    /// `valid()` must be true.
    pub fn key(&self) -> &'a [u8] {
        debug_assert!(self.valid());
        // SAFETY: every key in this skip list is an `EntryPtr` from a
        // completed `add`.
        unsafe { decode_entry(self.inner.key().0).internal_key }
    }

    /// The current entry's value bytes.
    ///
    /// # Preconditions
    /// `valid()` must be true.
    pub fn value(&self) -> &'a [u8] {
        debug_assert!(self.valid());
        // SAFETY: see `key`.
        unsafe { decode_entry(self.inner.key().0).value }
    }
}
