//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::wal::Operation;

use super::MemTableEntry;

/// In-memory table for recent writes
pub struct MemTable {
    data: RwLock<BTreeMap<Vec<u8>, MemTableEntry>>,
    /// Approximate size in bytes (keys + values)
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
        }
    }

    /// Get an entry by key (read lock)
    pub fn get(&self, key: &[u8]) -> Option<MemTableEntry> {
        self.data.read().get(key).cloned()
    }

    /// Put a key-value pair; returns the new approximate size
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> usize {
        let mut data = self.data.write();
        self.insert_locked(&mut data, key, MemTableEntry::Value(value))
    }

    /// Delete a key (inserts tombstone); returns the new approximate size
    pub fn delete(&self, key: Vec<u8>) -> usize {
        let mut data = self.data.write();
        self.insert_locked(&mut data, key, MemTableEntry::Tombstone)
    }

    /// Apply a whole write batch under a single write lock
    pub fn apply_batch(&self, operations: Vec<Operation>) -> usize {
        let mut data = self.data.write();
        let mut size = self.size.load(Ordering::SeqCst);
        for op in operations {
            size = match op {
                Operation::Put { key, value } => {
                    self.insert_locked(&mut data, key, MemTableEntry::Value(value))
                }
                Operation::Delete { key } => {
                    self.insert_locked(&mut data, key, MemTableEntry::Tombstone)
                }
            };
        }
        size
    }

    fn insert_locked(
        &self,
        data: &mut BTreeMap<Vec<u8>, MemTableEntry>,
        key: Vec<u8>,
        entry: MemTableEntry,
    ) -> usize {
        let added = key.len() + entry.size();
        let removed = data.get(&key).map(|old| key.len() + old.size()).unwrap_or(0);
        data.insert(key, entry);

        if added >= removed {
            self.size.fetch_add(added - removed, Ordering::SeqCst) + (added - removed)
        } else {
            self.size.fetch_sub(removed - added, Ordering::SeqCst) - (removed - added)
        }
    }

    /// Up to `limit` entries (tombstones included) with keys after `start`,
    /// in key order
    pub fn range(&self, start: Bound<&[u8]>, limit: usize) -> Vec<(Vec<u8>, MemTableEntry)> {
        self.data
            .read()
            .range::<[u8], _>((start, Bound::Unbounded))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    /// Get entry count (tombstones included)
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Snapshot of all entries in sorted key order (for flush)
    pub fn iter(&self) -> MemTableIterator {
        let snapshot: Vec<_> = self
            .data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        MemTableIterator {
            inner: snapshot.into_iter(),
        }
    }

    /// Clear all entries (after successful flush)
    pub fn clear(&self) {
        let mut data = self.data.write();
        data.clear();
        self.size.store(0, Ordering::SeqCst);
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over a MemTable snapshot
pub struct MemTableIterator {
    inner: std::vec::IntoIter<(Vec<u8>, MemTableEntry)>,
}

impl Iterator for MemTableIterator {
    type Item = (Vec<u8>, MemTableEntry);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}
