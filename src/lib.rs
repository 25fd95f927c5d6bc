//! # Memtable core
//!
//! The in-memory write-buffer of a log-structured key-value store: an
//! ordered, append-mostly table that absorbs recent writes before they are
//! flushed to immutable on-disk sorted tables.
//!
//! Two tightly coupled pieces form the core:
//!
//! - [`skiplist`]: a concurrent ordered map — a probabilistic skip list
//!   with single-writer / many-reader concurrency and arena-backed node
//!   storage.
//! - [`memtable`]: encodes multi-version key/value records (sequence
//!   number + operation type) into that skip list and answers point
//!   lookups against them.
//!
//! The durable write-ahead log, the on-disk table format, the compaction
//! scheduler, the version set, and the outer database façade are external
//! collaborators this crate does not implement.

pub mod arena;
pub mod config;
pub mod error;
pub mod memtable;
pub mod skiplist;
pub mod types;

pub use config::MemTableOptions;
pub use error::{Error, Result};
pub use memtable::{BytewiseComparator, LookupKey, LookupResult, MemTable, UserComparator};
