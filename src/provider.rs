//! Storage providers
//!
//! Each backend registers a provider; callers enumerate the providers or pick
//! one by name and open their conflicts store through it.

use std::path::Path;
use std::sync::Arc;

use crate::conflicts::{ConflictStore, ConflictsDatabase, HeapConflictsDatabase};
use crate::connection::ConnectionManager;
use crate::error::Result;

/// A selectable conflicts backend
pub trait StorageProvider: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn version(&self) -> &str;

    /// Open the backend's conflicts store rooted at `base_dir`
    fn open_conflicts(&self, base_dir: &Path) -> Result<Box<dyn ConflictStore>>;
}

/// The embedded-engine backend
pub struct LsmStorageProvider {
    manager: Arc<ConnectionManager>,
}

impl LsmStorageProvider {
    pub const NAME: &'static str = "lsm";

    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }
}

impl StorageProvider for LsmStorageProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Conflicts in one embedded LSM engine per namespace"
    }

    fn version(&self) -> &str {
        crate::VERSION
    }

    fn open_conflicts(&self, base_dir: &Path) -> Result<Box<dyn ConflictStore>> {
        let db = ConflictsDatabase::new(base_dir, Arc::clone(&self.manager))?;
        Ok(Box::new(db))
    }
}

/// The in-memory backend; `base_dir` is ignored
#[derive(Debug, Default)]
pub struct HeapStorageProvider;

impl HeapStorageProvider {
    pub const NAME: &'static str = "heap";
}

impl StorageProvider for HeapStorageProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Conflicts held in memory for the life of the store"
    }

    fn version(&self) -> &str {
        crate::VERSION
    }

    fn open_conflicts(&self, _base_dir: &Path) -> Result<Box<dyn ConflictStore>> {
        Ok(Box::new(HeapConflictsDatabase::new()))
    }
}

/// Every built-in provider; engine-backed ones share `manager`
pub fn find_providers(manager: &Arc<ConnectionManager>) -> Vec<Box<dyn StorageProvider>> {
    vec![
        Box::new(LsmStorageProvider::new(Arc::clone(manager))),
        Box::new(HeapStorageProvider),
    ]
}

/// The provider called `name`, if any
pub fn find_provider(manager: &Arc<ConnectionManager>, name: &str) -> Option<Box<dyn StorageProvider>> {
    find_providers(manager)
        .into_iter()
        .find(|provider| provider.name() == name)
}
