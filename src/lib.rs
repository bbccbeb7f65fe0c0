//! # conflictdb
//!
//! Conflict-tracking storage for a version-control engine over tree-shaped
//! data:
//! - Three-way merge conflicts keyed by '/'-delimited tree paths
//! - Isolated namespaces (one per transaction), each its own engine
//! - Reference-counted sharing of open engines across namespace views
//! - Prefix queries over a flat ordered keyspace, read in bounded batches
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │             ConflictStore / StorageProvider                  │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │       ConflictsDatabase  ──►  BatchCursor (prefix scans)     │
//! │          (Key Codec + Record Codec per record)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ acquire / release
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 ConnectionManager                            │
//! │        (one Engine per namespace directory, ref-counted)     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     WAL     │          │  MemTable   │
//!   │  (Batches)  │          │  (RwLock)   │
//!   └─────────────┘          └──────┬──────┘
//!                                   │
//!                                   ▼
//!                           ┌─────────────┐
//!                           │   Storage   │
//!                           │  (SSTable)  │
//!                           └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod wal;
pub mod memtable;
pub mod storage;
pub mod engine;

pub mod model;
pub mod codec;
pub mod connection;
pub mod conflicts;
pub mod provider;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ConflictError, Result};
pub use config::Config;
pub use engine::Engine;
pub use model::{Conflict, ObjectId};
pub use connection::{ConnectionManager, DbHandle, DbOptions};
pub use conflicts::{BatchCursor, ConflictStore, ConflictsDatabase, HeapConflictsDatabase};
pub use provider::{find_provider, find_providers, StorageProvider};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of conflictdb
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
