//! Write batches and per-write options

use crate::wal::Operation;

/// A set of puts and deletes committed atomically by `Engine::write`
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    operations: Vec<Operation>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.operations.push(Operation::Put {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.operations.push(Operation::Delete { key: key.into() });
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub(crate) fn into_operations(self) -> Vec<Operation> {
        self.operations
    }
}

/// Durability of a single write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// fsync the WAL before returning. When false the configured
    /// `WalSyncStrategy` decides.
    pub sync: bool,
}

impl WriteOptions {
    /// fsync before returning
    pub fn synced() -> Self {
        Self { sync: true }
    }

    /// Leave fsync to the sync strategy or a later `Engine::sync`
    pub fn relaxed() -> Self {
        Self { sync: false }
    }
}
