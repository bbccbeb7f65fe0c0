//! Engine-backed conflicts database
//!
//! Each namespace is one engine directory under the base directory. Engines
//! are never opened or closed here: handles come from the shared
//! `ConnectionManager` and are given back on namespace removal or `close`.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::codec::{decode_conflict, encode_conflict, is_prefix, key};
use crate::connection::{Connection, ConnectionManager, DbHandle, DbOptions};
use crate::engine::{Engine, WriteBatch, WriteOptions};
use crate::error::{ConflictError, Result};
use crate::model::Conflict;

use super::{namespace_dir, query_keys, BatchCursor, ConflictStore, BATCH_SIZE};

/// Namespaced conflicts storage over the embedded engine
///
/// ## Concurrency:
/// - `handles`: one handle per namespace this view has opened; engines are
///   acquired outside the lock and a duplicate from a lost race is released
/// - Engine calls run on a cloned `Arc<Connection>` outside the lock
pub struct ConflictsDatabase {
    base_dir: PathBuf,
    manager: Arc<ConnectionManager>,
    handles: RwLock<HashMap<String, DbHandle>>,
    batch_size: usize,
}

impl ConflictsDatabase {
    /// Create a view over `base_dir`, which must be an existing writable
    /// directory. Nothing is opened until a namespace is first used.
    pub fn new(base_dir: impl AsRef<Path>, manager: Arc<ConnectionManager>) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        if base_dir.as_os_str().is_empty() {
            return Err(ConflictError::InvalidArgument(
                "base directory must not be empty".to_string(),
            ));
        }

        let metadata = fs::metadata(base_dir).map_err(|e| {
            ConflictError::InvalidArgument(format!(
                "base directory {} is not accessible: {}",
                base_dir.display(),
                e
            ))
        })?;
        if !metadata.is_dir() {
            return Err(ConflictError::InvalidArgument(format!(
                "{} is not a directory",
                base_dir.display()
            )));
        }
        if metadata.permissions().readonly() {
            return Err(ConflictError::InvalidArgument(format!(
                "base directory {} is not writable",
                base_dir.display()
            )));
        }

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            manager,
            handles: RwLock::new(HashMap::new()),
            batch_size: BATCH_SIZE,
        })
    }

    /// Number of records decoded per cursor batch
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory holding the namespace's engine
    pub fn namespace_path(&self, namespace: Option<&str>) -> Result<PathBuf> {
        Ok(self.base_dir.join(namespace_dir(namespace)?))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn has_conflicts(&self, namespace: Option<&str>) -> Result<bool> {
        let Some(connection) = self.open(namespace, false)? else {
            return Ok(false);
        };
        let empty = connection
            .engine()
            .is_empty()
            .map_err(ConflictError::into_storage_io)?;
        Ok(!empty)
    }

    pub fn get_conflict(&self, namespace: Option<&str>, path: &str) -> Result<Option<Conflict>> {
        let Some(connection) = self.open(namespace, false)? else {
            return Ok(None);
        };
        let value = connection
            .engine()
            .get(&key(path))
            .map_err(ConflictError::into_storage_io)?;
        value.map(|bytes| decode_conflict(&bytes)).transpose()
    }

    /// All conflicts matching `prefix`, collected eagerly
    pub fn get_conflicts(&self, namespace: Option<&str>, prefix: Option<&str>) -> Result<Vec<Conflict>> {
        self.get_by_prefix(namespace, prefix).collect()
    }

    /// Lazy prefix query; see `BatchCursor`
    pub fn get_by_prefix(&self, namespace: Option<&str>, prefix: Option<&str>) -> BatchCursor<'_> {
        BatchCursor::new(self, namespace_dir(namespace), prefix, self.batch_size)
    }

    /// Count the conflict at `tree_path` plus everything below it, or every
    /// conflict when `tree_path` is `None`
    pub fn get_count_by_prefix(&self, namespace: Option<&str>, tree_path: Option<&str>) -> Result<u64> {
        let Some(connection) = self.open(namespace, false)? else {
            return Ok(0);
        };
        let engine = connection.engine();

        let (exact, prefix) = query_keys(tree_path);
        let mut count = 0u64;
        if let Some(exact) = exact {
            if engine.contains(&exact).map_err(ConflictError::into_storage_io)? {
                count += 1;
            }
        }
        for_each_matching_key(engine, prefix.as_deref(), |_| count += 1)?;

        Ok(count)
    }

    /// The subset of `paths` that currently have a conflict
    pub fn find_conflicts(&self, namespace: Option<&str>, paths: &[String]) -> Result<HashSet<String>> {
        let Some(connection) = self.open(namespace, false)? else {
            return Ok(HashSet::new());
        };
        let engine = connection.engine();

        let mut found = HashSet::new();
        for path in paths {
            if engine.contains(&key(path)).map_err(ConflictError::into_storage_io)? {
                found.insert(path.clone());
            }
        }
        Ok(found)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    pub fn add_conflict(&self, namespace: Option<&str>, conflict: &Conflict) -> Result<()> {
        self.add_conflicts(namespace, std::slice::from_ref(conflict))
    }

    /// Store every conflict in one atomic write
    pub fn add_conflicts(&self, namespace: Option<&str>, conflicts: &[Conflict]) -> Result<()> {
        if conflicts.is_empty() {
            return Ok(());
        }

        let mut batch = WriteBatch::new();
        for conflict in conflicts {
            batch.put(key(&conflict.path), encode_conflict(conflict)?);
        }

        let connection = self.open_or_create(namespace)?;
        connection
            .engine()
            .write(batch, &WriteOptions::default())
            .map_err(ConflictError::into_storage_io)?;

        tracing::debug!(
            "Stored {} conflicts in {}",
            conflicts.len(),
            connection.path().display()
        );
        Ok(())
    }

    pub fn remove_conflict(&self, namespace: Option<&str>, path: &str) -> Result<()> {
        let Some(connection) = self.open(namespace, false)? else {
            return Ok(());
        };
        connection
            .engine()
            .delete(&key(path), &WriteOptions::default())
            .map_err(ConflictError::into_storage_io)
    }

    /// Delete each path without a per-key sync, then sync once
    pub fn remove_conflicts(&self, namespace: Option<&str>, paths: &[String]) -> Result<()> {
        let Some(connection) = self.open(namespace, false)? else {
            return Ok(());
        };
        let engine = connection.engine();

        let relaxed = WriteOptions::relaxed();
        for path in paths {
            engine
                .delete(&key(path), &relaxed)
                .map_err(ConflictError::into_storage_io)?;
        }
        engine.sync().map_err(ConflictError::into_storage_io)
    }

    /// Delete the conflict at `prefix` and all of its descendants in one
    /// atomic write; with `None`, empty the namespace
    pub fn remove_by_prefix(&self, namespace: Option<&str>, prefix: Option<&str>) -> Result<()> {
        let Some(connection) = self.open(namespace, false)? else {
            return Ok(());
        };
        let removed = delete_matching(connection.engine(), prefix, &WriteOptions::default())?;
        tracing::debug!(
            "Removed {} conflicts under {:?} in {}",
            removed,
            prefix.unwrap_or(""),
            connection.path().display()
        );
        Ok(())
    }

    /// Drop the namespace from this view
    ///
    /// When no other view holds the namespace its directory is deleted;
    /// otherwise its records are cleared and the directory stays in use.
    pub fn remove_namespace(&self, namespace: Option<&str>) -> Result<()> {
        let dir = namespace_dir(namespace)?;

        let existing = self.handles.write().remove(&dir);
        let handle = match existing {
            Some(handle) => handle,
            None => {
                let path = self.base_dir.join(&dir);
                if !path.is_dir() {
                    return Ok(());
                }
                self.acquire(&path, false)?
            }
        };

        let path = handle.path().to_path_buf();

        // Other views keep the engine open: clear it before giving the
        // handle back
        let mut cleared = 0;
        let last = self.manager.release_with(handle, |engine| {
            cleared = delete_matching(engine, None, &WriteOptions::synced())?;
            Ok(())
        })?;

        if last {
            match fs::remove_dir_all(&path) {
                Ok(()) => tracing::info!("Removed namespace directory {}", path.display()),
                Err(e) => tracing::error!(
                    "Failed to delete namespace directory {}: {}",
                    path.display(),
                    e
                ),
            }
        } else {
            tracing::info!(
                "Namespace {} still referenced, cleared {} conflicts",
                path.display(),
                cleared
            );
        }

        Ok(())
    }

    /// Give every handle of this view back to the manager
    pub fn close(&self) {
        let handles: Vec<DbHandle> = self.handles.write().drain().map(|(_, h)| h).collect();
        for handle in handles {
            let path = handle.path().to_path_buf();
            if let Err(e) = self.manager.release(handle) {
                tracing::warn!("Failed to release {}: {}", path.display(), e);
            }
        }
    }

    // =========================================================================
    // Namespace resolution
    // =========================================================================

    fn open(&self, namespace: Option<&str>, create: bool) -> Result<Option<Arc<Connection>>> {
        self.resolve(&namespace_dir(namespace)?, create)
    }

    fn open_or_create(&self, namespace: Option<&str>) -> Result<Arc<Connection>> {
        let dir = namespace_dir(namespace)?;
        self.resolve(&dir, true)?.ok_or_else(|| {
            ConflictError::StorageIo(format!("namespace {} could not be created", dir))
        })
    }

    /// Connection for the namespace directory `dir`
    ///
    /// A namespace already on disk is opened on first use; a missing one is
    /// created only when `create` is set and otherwise resolves to `None`.
    pub(super) fn resolve(&self, dir: &str, create: bool) -> Result<Option<Arc<Connection>>> {
        if let Some(handle) = self.handles.read().get(dir) {
            return Ok(Some(handle.connection()));
        }

        let path = self.base_dir.join(dir);
        if !create && !path.is_dir() {
            return Ok(None);
        }

        // Open outside the map lock; if another caller got there first its
        // handle is kept and ours goes back
        let handle = self.acquire(&path, create)?;
        let mut handles = self.handles.write();
        if let Some(existing) = handles.get(dir) {
            let connection = existing.connection();
            drop(handles);
            self.manager.release(handle)?;
            return Ok(Some(connection));
        }
        let connection = handle.connection();
        handles.insert(dir.to_string(), handle);

        Ok(Some(connection))
    }

    fn acquire(&self, path: &Path, create: bool) -> Result<DbHandle> {
        let options = DbOptions::new(path)
            .map_err(ConflictError::into_storage_io)?
            .create_if_missing(create);
        self.manager.acquire(&options)
    }
}

impl Drop for ConflictsDatabase {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ConflictsDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictsDatabase")
            .field("base_dir", &self.base_dir)
            .field("namespaces", &self.handles.read().len())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

/// Visit every live key carrying `prefix`, stopping at the first key past it
fn for_each_matching_key(engine: &Engine, prefix: Option<&[u8]>, mut visit: impl FnMut(Vec<u8>)) -> Result<()> {
    for entry in engine.scan(prefix.unwrap_or_default()) {
        let (key, _) = entry.map_err(ConflictError::into_storage_io)?;
        if !is_prefix(prefix, &key) {
            break;
        }
        visit(key);
    }
    Ok(())
}

/// Delete the exact record at `prefix` and everything below it as one batch.
/// Returns the number of keys deleted.
fn delete_matching(engine: &Engine, prefix: Option<&str>, options: &WriteOptions) -> Result<usize> {
    let (exact, children) = query_keys(prefix);

    let mut batch = WriteBatch::new();
    if let Some(exact) = exact {
        if engine.contains(&exact).map_err(ConflictError::into_storage_io)? {
            batch.delete(exact);
        }
    }
    for_each_matching_key(engine, children.as_deref(), |key| batch.delete(key))?;

    let removed = batch.len();
    engine
        .write(batch, options)
        .map_err(ConflictError::into_storage_io)?;
    Ok(removed)
}

impl ConflictStore for ConflictsDatabase {
    fn has_conflicts(&self, namespace: Option<&str>) -> Result<bool> {
        ConflictsDatabase::has_conflicts(self, namespace)
    }

    fn get_conflict(&self, namespace: Option<&str>, path: &str) -> Result<Option<Conflict>> {
        ConflictsDatabase::get_conflict(self, namespace, path)
    }

    fn get_by_prefix(
        &self,
        namespace: Option<&str>,
        prefix: Option<&str>,
    ) -> Box<dyn Iterator<Item = Result<Conflict>> + '_> {
        Box::new(ConflictsDatabase::get_by_prefix(self, namespace, prefix))
    }

    fn get_count_by_prefix(&self, namespace: Option<&str>, tree_path: Option<&str>) -> Result<u64> {
        ConflictsDatabase::get_count_by_prefix(self, namespace, tree_path)
    }

    fn add_conflicts(&self, namespace: Option<&str>, conflicts: &[Conflict]) -> Result<()> {
        ConflictsDatabase::add_conflicts(self, namespace, conflicts)
    }

    fn remove_conflict(&self, namespace: Option<&str>, path: &str) -> Result<()> {
        ConflictsDatabase::remove_conflict(self, namespace, path)
    }

    fn remove_conflicts(&self, namespace: Option<&str>, paths: &[String]) -> Result<()> {
        ConflictsDatabase::remove_conflicts(self, namespace, paths)
    }

    fn find_conflicts(&self, namespace: Option<&str>, paths: &[String]) -> Result<HashSet<String>> {
        ConflictsDatabase::find_conflicts(self, namespace, paths)
    }

    fn remove_by_prefix(&self, namespace: Option<&str>, prefix: Option<&str>) -> Result<()> {
        ConflictsDatabase::remove_by_prefix(self, namespace, prefix)
    }

    fn remove_namespace(&self, namespace: Option<&str>) -> Result<()> {
        ConflictsDatabase::remove_namespace(self, namespace)
    }
}
