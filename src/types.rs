//! Core value types shared by the skip list and the memtable.

/// Raw user key bytes.
pub type Key = Vec<u8>;

/// Raw value bytes.
pub type Value = Vec<u8>;

/// Monotonically increasing logical timestamp assigned per write.
///
/// Only the low 56 bits are ever packed into a tag (see [`pack_tag`]); a
/// well-behaved caller never approaches that ceiling, but it is not
/// enforced here.
pub type SequenceNumber = u64;

/// Distinguishes puts from deletes.
///
/// A deletion writes a tombstone — the key isn't removed, it's marked as
/// deleted so that an older on-disk version of the same user key is
/// shadowed rather than resurrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ValueType {
    /// A tombstone marker.
    Deletion = 0,
    /// A normal put operation.
    Value = 1,
}

impl ValueType {
    /// Recovers a `ValueType` from its encoded low byte.
    ///
    /// Returns `None` for any byte other than the two values this crate
    /// ever writes — a corrupted or foreign tag.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ValueType::Deletion),
            1 => Some(ValueType::Value),
            _ => None,
        }
    }
}

/// The value type used when building a [`crate::memtable::LookupKey`].
///
/// Using the largest defined `ValueType` as the seek tag guarantees that
/// any real entry for the same user key and sequence number sorts at or
/// after the lookup key, so `find_ge` still lands on it.
pub const VALUE_TYPE_FOR_SEEK: ValueType = ValueType::Value;

/// Packs a sequence number and value type into the 8-byte tag stored after
/// every internal key: `(sequence << 8) | type`.
pub fn pack_tag(sequence: SequenceNumber, value_type: ValueType) -> u64 {
    (sequence << 8) | (value_type as u64)
}

/// Splits a tag back into its sequence number and low type byte.
///
/// The type byte is returned raw (not validated against [`ValueType`])
/// since an unrecognized byte is itself meaningful corruption information
/// to the caller.
pub fn unpack_tag(tag: u64) -> (SequenceNumber, u8) {
    (tag >> 8, (tag & 0xff) as u8)
}
