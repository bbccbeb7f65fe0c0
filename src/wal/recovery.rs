//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.

use std::fs::OpenOptions;
use std::path::Path;

use crate::error::{ConflictError, Result};

use super::{WalEntry, WalReader};

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Default)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted entries skipped (0 or 1: replay stops at the first)
    pub entries_corrupted: u64,

    /// Last valid LSN
    pub last_lsn: u64,

    /// Whether the WAL was truncated (partial writes removed)
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// This will:
    /// 1. Read all valid entries in order
    /// 2. Stop at the first torn or corrupted entry
    /// 3. Truncate the file after the last valid entry
    /// 4. Return all valid entries in order
    ///
    /// Nothing past a bad entry is replayed: later batches may depend on it.
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let mut reader = WalReader::open(path)?;
        let mut entries = Vec::new();
        let mut result = RecoveryResult::default();

        loop {
            match reader.next_entry() {
                Ok(Some(entry)) => {
                    result.entries_recovered += 1;
                    result.last_lsn = entry.lsn;
                    entries.push(entry);
                }
                Ok(None) => break,
                Err(ConflictError::WalCorruption(reason)) => {
                    tracing::warn!(
                        "Discarding WAL tail of {} at offset {}: {}",
                        path.display(),
                        reader.position(),
                        reason
                    );
                    result.entries_corrupted += 1;
                    result.was_truncated = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        if result.was_truncated {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(reader.position())?;
            file.sync_all()?;
        }

        Ok((entries, result))
    }
}
