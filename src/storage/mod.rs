//! Storage Module
//!
//! Persistent storage layer using an SSTable format.
//!
//! ## Responsibilities
//! - Persist flushed memtables to disk in sorted format
//! - Point lookups and bounded range reads
//!
//! Tables are never compacted: a namespace directory is short-lived and is
//! removed wholesale once its conflicts are resolved.

mod sstable;
mod manager;

pub use sstable::{SSTable, SSTableBuilder, SSTableReader};
pub use manager::{StorageManager, TableRange};
