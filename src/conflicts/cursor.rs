//! Batch Cursor
//!
//! Lazy prefix query over one namespace. Records are decoded a batch at a
//! time; each batch opens its own engine scan, positioned just after the last
//! key of the previous batch, and drops it before the batch is handed out.

use std::collections::VecDeque;

use crate::codec::{decode_conflict, is_prefix};
use crate::error::{ConflictError, Result};
use crate::model::Conflict;

use super::{query_keys, ConflictsDatabase};

/// Forward-only iterator over the conflicts matching a prefix
///
/// With a prefix, the conflict stored at the prefix itself comes first,
/// followed by its descendants in key order. Without one, every conflict of
/// the namespace is returned. An error is yielded after the records decoded
/// ahead of it, and ends the cursor.
pub struct BatchCursor<'a> {
    db: &'a ConflictsDatabase,
    /// Namespace directory; `None` when the namespace id was rejected
    dir: Option<String>,
    /// Exact key to probe before the first batch
    exact_key: Option<Vec<u8>>,
    /// Prefix every scanned key must carry; `None` matches all keys
    scan_prefix: Option<Vec<u8>>,
    last_match_key: Option<Vec<u8>>,
    batch: VecDeque<Conflict>,
    batch_size: usize,
    pending_error: Option<ConflictError>,
    reached_end: bool,
}

impl<'a> BatchCursor<'a> {
    pub(super) fn new(
        db: &'a ConflictsDatabase,
        namespace: Result<String>,
        prefix: Option<&str>,
        batch_size: usize,
    ) -> Self {
        let (exact_key, scan_prefix) = query_keys(prefix);
        let (dir, pending_error) = match namespace {
            Ok(dir) => (Some(dir), None),
            Err(e) => (None, Some(e)),
        };

        Self {
            db,
            reached_end: dir.is_none(),
            dir,
            exact_key,
            scan_prefix,
            last_match_key: None,
            batch: VecDeque::new(),
            batch_size: batch_size.max(1),
            pending_error,
        }
    }

    fn probe_exact(&self, dir: &str, exact: &[u8]) -> Result<Option<Conflict>> {
        let Some(connection) = self.db.resolve(dir, false)? else {
            return Ok(None);
        };
        let value = connection
            .engine()
            .get(exact)
            .map_err(ConflictError::into_storage_io)?;
        value.map(|bytes| decode_conflict(&bytes)).transpose()
    }

    /// Decode up to `batch_size` matching records into `batch`
    fn load_batch(&mut self, dir: &str) -> Result<()> {
        let Some(connection) = self.db.resolve(dir, false)? else {
            self.reached_end = true;
            return Ok(());
        };
        let engine = connection.engine();

        let mut scan = match &self.last_match_key {
            Some(last) => engine.scan_after(last),
            None => engine.scan(self.scan_prefix.as_deref().unwrap_or_default()),
        };

        while self.batch.len() < self.batch_size {
            let Some(entry) = scan.next() else {
                self.reached_end = true;
                break;
            };
            let (key, value) = entry.map_err(ConflictError::into_storage_io)?;
            if !is_prefix(self.scan_prefix.as_deref(), &key) {
                self.reached_end = true;
                break;
            }
            self.batch.push_back(decode_conflict(&value)?);
            self.last_match_key = Some(key);
        }

        Ok(())
    }
}

impl Iterator for BatchCursor<'_> {
    type Item = Result<Conflict>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(conflict) = self.batch.pop_front() {
                return Some(Ok(conflict));
            }
            if let Some(e) = self.pending_error.take() {
                return Some(Err(e));
            }
            if self.reached_end {
                return None;
            }
            let dir = self.dir.clone()?;

            if let Some(exact) = self.exact_key.take() {
                match self.probe_exact(&dir, &exact) {
                    Ok(Some(conflict)) => return Some(Ok(conflict)),
                    Ok(None) => {}
                    Err(e) => {
                        self.reached_end = true;
                        return Some(Err(e));
                    }
                }
            }

            if let Err(e) = self.load_batch(&dir) {
                self.reached_end = true;
                self.pending_error = Some(e);
                continue;
            }
            if self.batch.is_empty() {
                self.reached_end = true;
                return None;
            }
        }
    }
}
