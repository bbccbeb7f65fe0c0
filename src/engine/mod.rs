//! Engine Module
//!
//! The embedded ordered key-value store that backs one namespace directory.
//!
//! ## Responsibilities
//! - Coordinate WAL, MemTable, and Storage
//! - Atomic multi-key write batches
//! - Explicit durability barrier (`sync`)
//! - Ordered forward scans
//! - Trigger flushes when MemTable is full
//! - Manage crash recovery on startup

mod batch;
mod scan;

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{ConflictError, Result};
use crate::memtable::{MemTable, MemTableEntry};
use crate::storage::StorageManager;
use crate::wal::{WalRecovery, WalWriter};

pub use batch::{WriteBatch, WriteOptions};
pub use scan::{ScanIter, SCAN_CHUNK_SIZE};

/// The storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (write/put/delete/flush): Serialized by `write_lock`
///   - Must acquire: write_lock → WAL → memtable → storage (flush)
///
/// - **Reads** (get/scan): never take `write_lock`
///   - MemTable uses an internal RwLock
///   - StorageManager uses a read lock; each SSTableReader guards its file
pub struct Engine {
    config: Config,

    /// Directory for SSTables
    storage_dir: PathBuf,

    /// Write-ahead log (exclusive access needed)
    wal: Mutex<WalWriter>,

    /// In-memory table for recent writes (internal RwLock)
    memtable: MemTable,

    /// Persistent storage manager (internal RwLock on sstables vec)
    storage: StorageManager,

    /// Serializes write operations
    write_lock: Mutex<()>,
}

impl Engine {
    const WAL_FILENAME: &'static str = "wal.log";
    const SSTABLE_DIR: &'static str = "sstables";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Check (or create) the data directory
    /// 2. Load existing SSTables
    /// 3. Replay the WAL into the memtable, flush it, reset the WAL
    pub fn open(config: Config) -> Result<Self> {
        let data_dir = config.data_dir.clone();

        if !data_dir.exists() {
            if !config.create_if_missing {
                return Err(ConflictError::Storage(format!(
                    "data directory {} does not exist",
                    data_dir.display()
                )));
            }
            fs::create_dir_all(&data_dir)?;
        }
        if !data_dir.is_dir() {
            return Err(ConflictError::Storage(format!(
                "{} is not a directory",
                data_dir.display()
            )));
        }

        let storage_dir = data_dir.join(Self::SSTABLE_DIR);
        let wal_path = data_dir.join(Self::WAL_FILENAME);

        let storage = StorageManager::open(&storage_dir)?;
        let memtable = MemTable::new();

        let mut next_lsn = 1;
        if wal_path.exists() {
            let (entries, recovery) = WalRecovery::recover(&wal_path)?;

            if recovery.entries_recovered > 0 || recovery.entries_corrupted > 0 {
                tracing::info!(
                    "WAL recovery for {}: {} entries recovered, {} corrupted, last_lsn={}",
                    data_dir.display(),
                    recovery.entries_recovered,
                    recovery.entries_corrupted,
                    recovery.last_lsn
                );
            }

            for entry in entries {
                memtable.apply_batch(entry.operations);
            }
            next_lsn = recovery.last_lsn + 1;
        }

        let mut wal = WalWriter::open(&wal_path, config.wal_sync_strategy, next_lsn)?;

        // Make recovered data durable in an SSTable, then reset the WAL
        if !memtable.is_empty() {
            storage.flush(&memtable)?;
            memtable.clear();
            wal.truncate()?;
        }

        tracing::debug!("Engine opened at {}", data_dir.display());

        Ok(Self {
            config,
            storage_dir,
            wal: Mutex::new(wal),
            memtable,
            storage,
            write_lock: Mutex::new(()),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Get a value by key
    ///
    /// Search order:
    /// 1. MemTable (most recent writes)
    /// 2. SSTables (newest to oldest)
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.memtable.get(key) {
            return Ok(match entry {
                MemTableEntry::Value(value) => Some(value),
                MemTableEntry::Tombstone => None,
            });
        }

        self.storage.get(key)
    }

    /// Whether a live value exists for `key`
    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Apply a batch atomically
    ///
    /// Steps:
    /// 1. Acquire write lock
    /// 2. Append the whole batch as one WAL entry (durability + atomicity)
    /// 3. Apply it to the MemTable under one lock
    /// 4. Flush if the MemTable is full
    pub fn write(&self, batch: WriteBatch, options: &WriteOptions) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let _write_guard = self.write_lock.lock();
        let operations = batch.into_operations();

        self.wal.lock().append(operations.clone(), options.sync)?;

        let new_size = self.memtable.apply_batch(operations);
        if new_size >= self.config.memtable_size_limit {
            self.flush_internal()?;
        }

        Ok(())
    }

    /// Put a single key-value pair
    pub fn put(&self, key: &[u8], value: &[u8], options: &WriteOptions) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write(batch, options)
    }

    /// Delete a single key (no error if absent)
    pub fn delete(&self, key: &[u8], options: &WriteOptions) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write(batch, options)
    }

    /// Durability barrier: every write accepted so far is on disk when
    /// this returns
    pub fn sync(&self) -> Result<()> {
        self.wal.lock().sync()
    }

    /// Scan live entries with keys `>= start`, in key order
    pub fn scan(&self, start: &[u8]) -> ScanIter<'_> {
        ScanIter::new(self, start, false, SCAN_CHUNK_SIZE)
    }

    /// Scan live entries with keys strictly after `key`, in key order
    pub fn scan_after(&self, key: &[u8]) -> ScanIter<'_> {
        ScanIter::new(self, key, true, SCAN_CHUNK_SIZE)
    }

    /// Scan the whole keyspace
    pub fn scan_all(&self) -> ScanIter<'_> {
        self.scan(&[])
    }

    /// Whether the keyspace has no live entries
    pub fn is_empty(&self) -> Result<bool> {
        match ScanIter::new(self, &[], false, 1).next() {
            None => Ok(true),
            Some(Ok(_)) => Ok(false),
            Some(Err(e)) => Err(e),
        }
    }

    /// Flush memtable to disk
    ///
    /// Forces a flush regardless of memtable size
    pub fn flush(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.flush_internal()
    }

    /// Called with write lock held
    fn flush_internal(&self) -> Result<()> {
        if self.memtable.is_empty() {
            return Ok(());
        }

        // SSTable first, then clear: readers check the memtable before the
        // SSTables, so every key stays visible throughout
        self.storage.flush(&self.memtable)?;
        self.memtable.clear();
        self.wal.lock().truncate()?;

        Ok(())
    }

    /// Flush pending data and sync. The engine stays usable; files are
    /// released when it is dropped.
    pub fn close(&self) -> Result<()> {
        self.flush()?;
        self.sync()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the storage directory path (where SSTables are stored)
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Get the memtable entry count
    pub fn memtable_entry_count(&self) -> usize {
        self.memtable.entry_count()
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.storage.sstable_count()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
