//! Error types for conflictdb
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using ConflictError
pub type Result<T> = std::result::Result<T, ConflictError>;

/// Unified error type for conflictdb operations
#[derive(Debug, Error)]
pub enum ConflictError {
    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Conflicts Layer Errors
    // -------------------------------------------------------------------------
    #[error("Storage unavailable at {path}: {source}")]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: Box<ConflictError>,
    },

    #[error("Storage I/O error: {0}")]
    StorageIo(String),

    #[error("Codec error: {0}")]
    Codec(String),

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    // -------------------------------------------------------------------------
    // Engine Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Key not found")]
    KeyNotFound,

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ConflictError {
    /// Wrap an engine failure that happened while opening `path`
    pub fn unavailable(path: impl Into<PathBuf>, source: ConflictError) -> Self {
        ConflictError::StorageUnavailable {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Map an engine-level failure against an open handle to the conflicts
    /// layer taxonomy. Codec and argument errors pass through unchanged.
    pub fn into_storage_io(self) -> Self {
        match self {
            e @ (ConflictError::InvalidArgument(_)
            | ConflictError::StorageUnavailable { .. }
            | ConflictError::StorageIo(_)
            | ConflictError::Codec(_)) => e,
            other => ConflictError::StorageIo(other.to_string()),
        }
    }
}

impl From<bincode::Error> for ConflictError {
    fn from(e: bincode::Error) -> Self {
        ConflictError::Serialization(e.to_string())
    }
}
