//! Internal-key ordering: `user_key || 8-byte tag`, compared by user key
//! first and then by tag **in reverse**, so the newest version of a user
//! key sorts first.

use std::cmp::Ordering;

use super::varint::put_varint32;
use crate::types::{SequenceNumber, VALUE_TYPE_FOR_SEEK, pack_tag};

/// A pluggable strict weak order over raw byte strings, supplied by the
/// caller at memtable construction.
pub trait UserComparator {
    /// Returns `Less`/`Equal`/`Greater` for `a` relative to `b`.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Plain lexicographic unsigned byte comparison — the default
/// `UserComparator`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytewiseComparator;

impl UserComparator for BytewiseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Orders internal keys (`user_key || tag`) by user key, then by tag
/// descending, wrapping an inner [`UserComparator`].
#[derive(Debug, Default, Clone, Copy)]
pub struct InternalKeyComparator<U> {
    user_cmp: U,
}

impl<U: UserComparator> InternalKeyComparator<U> {
    /// Wraps `user_cmp` as the internal-key comparator's user-key ordering.
    pub fn new(user_cmp: U) -> Self {
        Self { user_cmp }
    }

    /// The user comparator this internal-key comparator was built over.
    pub fn user_comparator(&self) -> &U {
        &self.user_cmp
    }

    /// Compares two internal keys, each exactly `user_key || 8-byte tag`.
    ///
    /// # Preconditions
    /// Both slices must be at least 8 bytes long; checked by a debug
    /// assertion only, since a shorter slice indicates a malformed record
    /// from elsewhere in the crate, not external input reaching this call.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        debug_assert!(a.len() >= 8 && b.len() >= 8, "internal key shorter than the 8-byte tag");
        let (a_user, a_tag) = a.split_at(a.len() - 8);
        let (b_user, b_tag) = b.split_at(b.len() - 8);
        match self.user_cmp.compare(a_user, b_user) {
            Ordering::Equal => {
                let a_tag = u64::from_le_bytes(a_tag.try_into().unwrap());
                let b_tag = u64::from_le_bytes(b_tag.try_into().unwrap());
                // Reversed: a larger tag (newer sequence) sorts first.
                b_tag.cmp(&a_tag)
            }
            other => other,
        }
    }
}

/// A pre-encoded internal key used to seek the newest version of a user key
/// at or before a given sequence number.
///
/// `memtable_key()` packs the query sequence with [`VALUE_TYPE_FOR_SEEK`] —
/// the largest defined tag for that sequence — so `find_ge` lands on the
/// first real entry for the same user key, whatever its actual type.
pub struct LookupKey {
    /// `varint32(internal_key_size) || user_key || tag`.
    buf: Vec<u8>,
    /// Offset of `user_key` within `buf` (i.e. the varint's encoded length).
    user_key_start: usize,
}

impl LookupKey {
    /// Builds a lookup key for `user_key` at `sequence`.
    pub fn new(user_key: &[u8], sequence: SequenceNumber) -> Self {
        let internal_key_size = user_key.len() + 8;
        let mut buf = Vec::with_capacity(5 + internal_key_size);
        put_varint32(&mut buf, internal_key_size as u32);
        let user_key_start = buf.len();
        buf.extend_from_slice(user_key);
        let tag = pack_tag(sequence, VALUE_TYPE_FOR_SEEK);
        buf.extend_from_slice(&tag.to_le_bytes());
        Self { buf, user_key_start }
    }

    /// The length-prefixed encoded internal key, ready to feed to the
    /// skip-list comparator via a seek.
    pub fn memtable_key(&self) -> &[u8] {
        &self.buf
    }

    /// The raw user key bytes, with no length prefix or tag.
    pub fn user_key(&self) -> &[u8] {
        &self.buf[self.user_key_start..self.buf.len() - 8]
    }
}
