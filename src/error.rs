use std::fmt;

/// Unified error type for the memtable core.
///
/// Structural misuse (duplicate insert, operations on an invalid iterator)
/// is a debug assertion, not a variant here — it indicates a bug in a
/// caller, not a runtime condition a caller should branch on.
#[derive(Debug)]
pub enum Error {
    /// A decoded record's tag byte did not match a known `ValueType`.
    ///
    /// Only happens when the arena holds a record that wasn't written by
    /// this crate's own encoder (e.g. a replayed, truncated, or bit-flipped
    /// write-ahead-log record).
    Corruption(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Corruption(msg) => write!(f, "corruption: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
