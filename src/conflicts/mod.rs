//! Conflicts Module
//!
//! Namespaced storage of unresolved merge conflicts.
//!
//! ## Layout
//! ```text
//! {base_dir}/
//!   ├── .default/      (conflicts outside any transaction)
//!   └── .{tx_id}/      (one engine directory per transaction)
//! ```
//!
//! Every operation takes an optional namespace (transaction id); `None`
//! addresses the default namespace.

mod cursor;
mod database;
mod heap;

use std::collections::HashSet;

use crate::codec::key::SEPARATOR;
use crate::codec::{child_prefix, key};
use crate::error::{ConflictError, Result};
use crate::model::Conflict;

pub use cursor::BatchCursor;
pub use database::ConflictsDatabase;
pub use heap::HeapConflictsDatabase;

/// Conflicts read per cursor batch
pub const BATCH_SIZE: usize = 1000;

/// Directory name of the default namespace
pub const DEFAULT_NAMESPACE: &str = ".default";

/// The conflicts interface the rest of the system programs against
///
/// Implementations must keep namespaces fully isolated and apply every
/// multi-record write or delete atomically.
pub trait ConflictStore: Send + Sync {
    /// Whether the namespace holds any conflict
    fn has_conflicts(&self, namespace: Option<&str>) -> Result<bool>;

    /// The conflict stored at exactly `path`
    fn get_conflict(&self, namespace: Option<&str>, path: &str) -> Result<Option<Conflict>>;

    /// The conflict at `prefix` itself (if any) followed by all conflicts
    /// below it; every conflict when `prefix` is `None`
    fn get_by_prefix(
        &self,
        namespace: Option<&str>,
        prefix: Option<&str>,
    ) -> Box<dyn Iterator<Item = Result<Conflict>> + '_>;

    /// Eagerly collected `get_by_prefix`
    fn get_conflicts(&self, namespace: Option<&str>, prefix: Option<&str>) -> Result<Vec<Conflict>> {
        self.get_by_prefix(namespace, prefix).collect()
    }

    /// Number of conflicts `get_by_prefix` would return
    fn get_count_by_prefix(&self, namespace: Option<&str>, tree_path: Option<&str>) -> Result<u64>;

    fn add_conflict(&self, namespace: Option<&str>, conflict: &Conflict) -> Result<()> {
        self.add_conflicts(namespace, std::slice::from_ref(conflict))
    }

    /// Store all conflicts in one atomic write, replacing existing ones at
    /// the same paths
    fn add_conflicts(&self, namespace: Option<&str>, conflicts: &[Conflict]) -> Result<()>;

    fn remove_conflict(&self, namespace: Option<&str>, path: &str) -> Result<()>;

    /// Remove the conflicts at `paths`; durable when this returns
    fn remove_conflicts(&self, namespace: Option<&str>, paths: &[String]) -> Result<()>;

    /// The subset of `paths` that have a conflict
    fn find_conflicts(&self, namespace: Option<&str>, paths: &[String]) -> Result<HashSet<String>>;

    /// Remove the conflict at `prefix` and every conflict below it in one
    /// atomic write; everything when `prefix` is `None`
    fn remove_by_prefix(&self, namespace: Option<&str>, prefix: Option<&str>) -> Result<()>;

    /// Drop the whole namespace
    fn remove_namespace(&self, namespace: Option<&str>) -> Result<()>;
}

/// Directory (and registry) name of a namespace
///
/// Namespace ids become directory names, so they may not be empty, contain
/// path separators, or be `.`/`..`.
pub(crate) fn namespace_dir(namespace: Option<&str>) -> Result<String> {
    match namespace {
        None => Ok(DEFAULT_NAMESPACE.to_string()),
        Some(id) if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) => {
            Err(ConflictError::InvalidArgument(format!(
                "invalid namespace id {:?}",
                id
            )))
        }
        Some(id) => Ok(format!(".{}", id)),
    }
}

/// Exact key and child prefix of a prefix query
///
/// An absent or empty prefix matches everything. A prefix ending in `/` is
/// its own child prefix, so it has no separate exact key.
pub(crate) fn query_keys(prefix: Option<&str>) -> (Option<Vec<u8>>, Option<Vec<u8>>) {
    match prefix {
        None | Some("") => (None, None),
        Some(p) if p.ends_with(SEPARATOR) => (None, Some(child_prefix(p))),
        Some(p) => (Some(key(p)), Some(child_prefix(p))),
    }
}
