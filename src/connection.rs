//! Connection Manager
//!
//! Process-scoped, reference-counted registry of open engines.
//!
//! ## Responsibilities
//! - Open each engine directory at most once, however many views use it
//!   and whatever open options they pass
//! - Count handles per directory and close the engine on the last release
//! - Tell the last releaser that it may delete the directory
//!
//! The embedding application creates one `ConnectionManager`, shares it via
//! `Arc` with every `ConflictsDatabase`, and calls `close_all` on shutdown.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{ConflictError, Result};

/// What to open
///
/// Connections are shared per `path`; `create_if_missing` only matters to
/// the acquire that performs the physical open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbOptions {
    path: PathBuf,
    create_if_missing: bool,
}

impl DbOptions {
    /// Options for the engine at `path`, made absolute against the current
    /// directory
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        Ok(Self {
            path,
            create_if_missing: true,
        })
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// One open engine
pub struct Connection {
    options: DbOptions,
    engine: Engine,
}

impl Connection {
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn path(&self) -> &Path {
        &self.options.path
    }
}

/// A counted reference to an open engine
///
/// Not `Clone`: every handle is one count in the registry and must be given
/// back through `ConnectionManager::release`.
pub struct DbHandle {
    connection: Arc<Connection>,
}

impl DbHandle {
    pub fn engine(&self) -> &Engine {
        &self.connection.engine
    }

    pub fn path(&self) -> &Path {
        self.connection.path()
    }

    pub fn options(&self) -> &DbOptions {
        &self.connection.options
    }

    /// Shared access for short-lived readers such as batch cursors
    pub(crate) fn connection(&self) -> Arc<Connection> {
        Arc::clone(&self.connection)
    }
}

impl std::fmt::Debug for DbHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbHandle")
            .field("path", &self.path())
            .finish()
    }
}

/// Counters of physical engine opens and closes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStats {
    pub opened: u64,
    pub closed: u64,
    /// Connections currently open
    pub live: usize,
}

/// Registry entry of one path
///
/// Its mutex serializes open, release and close of that path only.
#[derive(Default)]
struct Slot {
    state: Mutex<SlotState>,
}

#[derive(Default)]
struct SlotState {
    /// `None` until the first acquire has opened the engine
    connection: Option<Arc<Connection>>,
    refs: usize,
    /// Removed from the registry; whoever still holds the slot must look the
    /// path up again
    retired: bool,
}

/// Reference-counted registry of open engines
///
/// ## Concurrency:
/// - `registry`: path → slot map; held only to look up, insert or remove a
///   slot, never across an engine open or close
/// - `Slot::state`: per-path lock held while that engine is opened, released
///   or closed, so racing acquires of one path perform exactly one physical
///   open while other paths proceed
/// - Lock order: a slot lock may be held while taking `registry`, never the
///   other way round
pub struct ConnectionManager {
    /// Settings for every engine opened; `data_dir` and
    /// `create_if_missing` come from the `DbOptions`
    engine_config: Config,
    registry: Mutex<HashMap<PathBuf, Arc<Slot>>>,
    opened: AtomicU64,
    closed: AtomicU64,
}

impl ConnectionManager {
    pub fn new(engine_config: Config) -> Self {
        Self {
            engine_config,
            registry: Mutex::new(HashMap::new()),
            opened: AtomicU64::new(0),
            closed: AtomicU64::new(0),
        }
    }

    /// Get a handle to the engine at `options.path`, opening it if needed
    ///
    /// An engine that is already open is shared regardless of
    /// `create_if_missing`.
    pub fn acquire(&self, options: &DbOptions) -> Result<DbHandle> {
        loop {
            let slot = Arc::clone(self.registry.lock().entry(options.path.clone()).or_default());

            let mut guard = slot.state.lock();
            let state = &mut *guard;
            if state.retired {
                continue;
            }

            if let Some(connection) = &state.connection {
                state.refs += 1;
                tracing::debug!(
                    "Reusing connection to {} (refs={})",
                    options.path.display(),
                    state.refs
                );
                return Ok(DbHandle {
                    connection: Arc::clone(connection),
                });
            }

            let mut config = self.engine_config.clone();
            config.data_dir = options.path.clone();
            config.create_if_missing = options.create_if_missing;

            let engine = match Engine::open(config) {
                Ok(engine) => engine,
                Err(e) => {
                    state.retired = true;
                    self.unregister(&options.path, &slot);
                    return Err(ConflictError::unavailable(options.path.clone(), e));
                }
            };
            self.opened.fetch_add(1, Ordering::SeqCst);

            let connection = Arc::new(Connection {
                options: options.clone(),
                engine,
            });
            state.connection = Some(Arc::clone(&connection));
            state.refs = 1;
            tracing::debug!("Opened connection to {}", options.path.display());

            return Ok(DbHandle { connection });
        }
    }

    /// Give a handle back
    ///
    /// Returns `true` when this was the last reference: the engine has been
    /// closed and the caller may delete its directory. A handle that this
    /// manager did not hand out is rejected.
    pub fn release(&self, handle: DbHandle) -> Result<bool> {
        self.release_with(handle, |_| Ok(()))
    }

    /// Give a handle back, first running `if_shared` on its engine when other
    /// handles remain
    ///
    /// `if_shared` runs while this handle is still counted and the path is
    /// locked, so the engine cannot be closed underneath it. The handle is
    /// released even if `if_shared` fails; its error is returned.
    pub fn release_with<F>(&self, handle: DbHandle, if_shared: F) -> Result<bool>
    where
        F: FnOnce(&Engine) -> Result<()>,
    {
        let path = handle.path().to_path_buf();

        let slot = self.registry.lock().get(&path).cloned().ok_or_else(|| {
            ConflictError::InvalidArgument(format!(
                "no open connection registered for {}",
                path.display()
            ))
        })?;

        let mut guard = slot.state.lock();
        let state = &mut *guard;
        let registered = !state.retired
            && state
                .connection
                .as_ref()
                .is_some_and(|connection| Arc::ptr_eq(connection, &handle.connection));
        if !registered {
            return Err(ConflictError::InvalidArgument(format!(
                "handle for {} was not acquired from this manager",
                path.display()
            )));
        }

        if state.refs > 1 {
            let outcome = if_shared(handle.engine());
            state.refs -= 1;
            tracing::debug!(
                "Released connection to {} (refs={})",
                path.display(),
                state.refs
            );
            return outcome.map(|()| false);
        }

        state.refs = 0;
        state.retired = true;
        let connection = state.connection.take();
        drop(handle);
        if let Some(connection) = connection {
            self.close_connection(&connection);
        }
        self.unregister(&path, &slot);

        Ok(true)
    }

    /// Release every registered connection regardless of its count
    pub fn close_all(&self) {
        let slots: Vec<Arc<Slot>> = self.registry.lock().drain().map(|(_, slot)| slot).collect();
        for slot in slots {
            let mut state = slot.state.lock();
            state.retired = true;
            state.refs = 0;
            if let Some(connection) = state.connection.take() {
                self.close_connection(&connection);
            }
        }
    }

    /// Whether an engine at `path` is currently open
    pub fn is_open(&self, path: &Path) -> bool {
        let Some(slot) = self.registry.lock().get(path).cloned() else {
            return false;
        };
        let state = slot.state.lock();
        state.connection.is_some()
    }

    pub fn stats(&self) -> ConnectionStats {
        let slots: Vec<Arc<Slot>> = self.registry.lock().values().cloned().collect();
        ConnectionStats {
            opened: self.opened.load(Ordering::SeqCst),
            closed: self.closed.load(Ordering::SeqCst),
            live: slots
                .iter()
                .filter(|slot| slot.state.lock().connection.is_some())
                .count(),
        }
    }

    /// Drop `slot` from the registry unless the path already has a newer one
    fn unregister(&self, path: &Path, slot: &Arc<Slot>) {
        let mut registry = self.registry.lock();
        if registry
            .get(path)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            registry.remove(path);
        }
    }

    fn close_connection(&self, connection: &Connection) {
        if let Err(e) = connection.engine.close() {
            tracing::warn!(
                "Error closing engine at {}: {}",
                connection.path().display(),
                e
            );
        }
        self.closed.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Closed connection to {}", connection.path().display());
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close_all();
    }
}
