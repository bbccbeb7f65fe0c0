//! Forward range scans
//!
//! A scan merges the memtable with every SSTable in key order, newest
//! source winning, and hides tombstones. It reads ahead a bounded chunk at a
//! time and holds no engine lock between chunks, so a scan left idle never
//! blocks writers or flushes.

use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;

use crate::error::Result;

use super::Engine;

/// Entries fetched per read-ahead
pub const SCAN_CHUNK_SIZE: usize = 256;

/// Iterator over live `(key, value)` pairs in byte-lexicographic key order
pub struct ScanIter<'a> {
    engine: &'a Engine,
    buffer: VecDeque<(Vec<u8>, Vec<u8>)>,
    /// Inclusive start of the first chunk
    start: Vec<u8>,
    /// Last key of the previous chunk; the next chunk starts after it
    resume_after: Option<Vec<u8>>,
    chunk_size: usize,
    done: bool,
}

impl<'a> ScanIter<'a> {
    /// Scan from `start`, inclusive unless `exclusive` is set
    pub(super) fn new(engine: &'a Engine, start: &[u8], exclusive: bool, chunk_size: usize) -> Self {
        Self {
            engine,
            buffer: VecDeque::new(),
            start: start.to_vec(),
            resume_after: exclusive.then(|| start.to_vec()),
            chunk_size: chunk_size.max(1),
            done: false,
        }
    }

    /// Load the next chunk. Returns false once the keyspace is exhausted.
    fn fill(&mut self) -> Result<bool> {
        let bound = match &self.resume_after {
            Some(last) => Bound::Excluded(last.as_slice()),
            None => Bound::Included(self.start.as_slice()),
        };

        let chunk = self.engine.read_chunk(bound, self.chunk_size)?;
        if chunk.len() < self.chunk_size {
            self.done = true;
        }

        let Some((last, _)) = chunk.last() else {
            self.done = true;
            return Ok(false);
        };
        self.resume_after = Some(last.clone());

        self.buffer.extend(
            chunk
                .into_iter()
                .filter_map(|(key, value)| value.map(|v| (key, v))),
        );
        Ok(true)
    }
}

impl Iterator for ScanIter<'_> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.buffer.pop_front() {
                return Some(Ok(entry));
            }
            if self.done {
                return None;
            }
            match self.fill() {
                Ok(true) => continue,
                Ok(false) => return None,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl Engine {
    /// Merge up to `limit` keys after `start` from the memtable and all
    /// SSTables. Tombstones are kept (as `None`) so the caller can resume
    /// after them.
    ///
    /// Each source contributes its first `limit` keys, and the merged result
    /// is cut to the first `limit` keys: every key up to that cut is then
    /// complete across all sources.
    pub(super) fn read_chunk(
        &self,
        start: Bound<&[u8]>,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Option<Vec<u8>>)>> {
        let mut merged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = BTreeMap::new();

        // MemTable before SSTables: a concurrent flush installs the new table
        // before clearing the memtable, so nothing is missed in between
        for (key, entry) in self.memtable.range(start, limit) {
            merged.insert(key, entry.into_value());
        }
        for table in self.storage.scan(start, limit)? {
            for (key, value) in table {
                merged.entry(key).or_insert(value);
            }
        }

        Ok(merged.into_iter().take(limit).collect())
    }
}
