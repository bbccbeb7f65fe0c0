//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::{ConflictError, Result};

use super::{Operation, WalEntry};

/// Writes entries to the WAL file
pub struct WalWriter {
    path: PathBuf,
    file: BufWriter<File>,
    /// LSN handed to the next appended entry
    current_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Entries written since the last fsync
    uncommitted: usize,
}

impl WalWriter {
    /// Open or create a WAL file, numbering new entries from `next_lsn`
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy, next_lsn: u64) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file: BufWriter::new(file),
            current_lsn: next_lsn.max(1),
            sync_strategy,
            uncommitted: 0,
        })
    }

    /// Append a batch as one entry and return its LSN
    ///
    /// The entry reaches the OS before this returns. It is fsynced when
    /// `force_sync` is set or the sync strategy says so.
    pub fn append(&mut self, operations: Vec<Operation>, force_sync: bool) -> Result<u64> {
        let lsn = self.current_lsn;
        let bytes = WalEntry::new(lsn, operations).serialize()?;

        self.file.write_all(&bytes)?;
        self.file.flush()?;
        self.current_lsn += 1;
        self.uncommitted += 1;

        let strategy_wants_sync = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.uncommitted >= count,
        };
        if force_sync || strategy_wants_sync {
            self.sync()?;
        }

        Ok(lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_data()?;
        self.uncommitted = 0;
        Ok(())
    }

    /// Drop every entry (called once they are durable in an SSTable).
    /// LSNs keep increasing across truncations.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().set_len(0).map_err(|e| {
            ConflictError::Storage(format!(
                "Failed to truncate WAL {}: {}",
                self.path.display(),
                e
            ))
        })?;
        self.file.get_ref().sync_all()?;
        self.uncommitted = 0;
        Ok(())
    }

    /// Get the LSN the next entry will receive
    pub fn current_lsn(&self) -> u64 {
        self.current_lsn
    }

    /// Entries appended since the last fsync
    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted
    }
}
