//! In-memory conflicts store
//!
//! Same contract as `ConflictsDatabase`, held in ordered maps. Used where
//! nothing needs to survive the process, and as a reference backend in tests.

use std::collections::{BTreeMap, HashMap, HashSet};

use parking_lot::RwLock;

use crate::codec::{is_prefix, key};
use crate::error::Result;
use crate::model::Conflict;

use super::{namespace_dir, query_keys, ConflictStore};

type Namespace = BTreeMap<Vec<u8>, Conflict>;

#[derive(Debug, Default)]
pub struct HeapConflictsDatabase {
    namespaces: RwLock<HashMap<String, Namespace>>,
}

impl HeapConflictsDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, namespace: Option<&str>, default: T, f: impl FnOnce(&Namespace) -> T) -> Result<T> {
        let dir = namespace_dir(namespace)?;
        Ok(self.namespaces.read().get(&dir).map_or(default, f))
    }

    fn write<T>(&self, namespace: Option<&str>, f: impl FnOnce(&mut Namespace) -> T) -> Result<Option<T>> {
        let dir = namespace_dir(namespace)?;
        Ok(self.namespaces.write().get_mut(&dir).map(f))
    }
}

/// Conflicts of `map` matching a prefix query, exact match first
fn matching(map: &Namespace, prefix: Option<&str>) -> Vec<Conflict> {
    let (exact, children) = query_keys(prefix);

    let mut out = Vec::new();
    if let Some(conflict) = exact.and_then(|k| map.get(&k)) {
        out.push(conflict.clone());
    }
    let start = children.clone().unwrap_or_default();
    out.extend(
        map.range(start..)
            .take_while(|(k, _)| is_prefix(children.as_deref(), k))
            .map(|(_, conflict)| conflict.clone()),
    );
    out
}

impl ConflictStore for HeapConflictsDatabase {
    fn has_conflicts(&self, namespace: Option<&str>) -> Result<bool> {
        self.read(namespace, false, |map| !map.is_empty())
    }

    fn get_conflict(&self, namespace: Option<&str>, path: &str) -> Result<Option<Conflict>> {
        self.read(namespace, None, |map| map.get(&key(path)).cloned())
    }

    fn get_by_prefix(
        &self,
        namespace: Option<&str>,
        prefix: Option<&str>,
    ) -> Box<dyn Iterator<Item = Result<Conflict>> + '_> {
        match self.read(namespace, Vec::new(), |map| matching(map, prefix)) {
            Ok(conflicts) => Box::new(conflicts.into_iter().map(Ok)),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn get_count_by_prefix(&self, namespace: Option<&str>, tree_path: Option<&str>) -> Result<u64> {
        self.read(namespace, 0, |map| matching(map, tree_path).len() as u64)
    }

    fn add_conflicts(&self, namespace: Option<&str>, conflicts: &[Conflict]) -> Result<()> {
        if conflicts.is_empty() {
            return Ok(());
        }
        let dir = namespace_dir(namespace)?;
        let mut namespaces = self.namespaces.write();
        let map = namespaces.entry(dir).or_default();
        for conflict in conflicts {
            map.insert(key(&conflict.path), conflict.clone());
        }
        Ok(())
    }

    fn remove_conflict(&self, namespace: Option<&str>, path: &str) -> Result<()> {
        self.write(namespace, |map| map.remove(&key(path)))?;
        Ok(())
    }

    fn remove_conflicts(&self, namespace: Option<&str>, paths: &[String]) -> Result<()> {
        self.write(namespace, |map| {
            for path in paths {
                map.remove(&key(path));
            }
        })?;
        Ok(())
    }

    fn find_conflicts(&self, namespace: Option<&str>, paths: &[String]) -> Result<HashSet<String>> {
        self.read(namespace, HashSet::new(), |map| {
            paths
                .iter()
                .filter(|path| map.contains_key(&key(path)))
                .cloned()
                .collect()
        })
    }

    fn remove_by_prefix(&self, namespace: Option<&str>, prefix: Option<&str>) -> Result<()> {
        let (exact, children) = query_keys(prefix);
        self.write(namespace, |map| {
            if let Some(exact) = exact {
                map.remove(&exact);
            }
            map.retain(|k, _| !is_prefix(children.as_deref(), k));
        })?;
        Ok(())
    }

    fn remove_namespace(&self, namespace: Option<&str>) -> Result<()> {
        let dir = namespace_dir(namespace)?;
        self.namespaces.write().remove(&dir);
        Ok(())
    }
}
