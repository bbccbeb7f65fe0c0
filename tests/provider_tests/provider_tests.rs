//! Tests for storage provider discovery
//!
//! These tests verify:
//! - Both built-in providers are discoverable by name
//! - Every provider's store honors the same conflicts contract

use std::collections::HashSet;
use std::sync::Arc;

use conflictdb::connection::ConnectionManager;
use conflictdb::provider::{HeapStorageProvider, LsmStorageProvider};
use conflictdb::{find_provider, find_providers, Conflict, ConflictStore, ObjectId};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn conflict(path: &str) -> Conflict {
    let id = ObjectId::from_raw([0x5A; ObjectId::NUM_BYTES]);
    Conflict::new(path, id, ObjectId::NULL, id)
}

fn paths(store: &dyn ConflictStore, ns: Option<&str>, prefix: Option<&str>) -> Vec<String> {
    store
        .get_by_prefix(ns, prefix)
        .map(|c| c.unwrap().path)
        .collect()
}

/// The shared behavioral contract every backend must satisfy
fn check_contract(store: &dyn ConflictStore) {
    let ns = Some("tx");
    let batch: Vec<Conflict> = ["a", "a/b", "a/c", "x"].into_iter().map(conflict).collect();
    store.add_conflicts(ns, &batch).unwrap();

    // Prefix query and count
    assert_eq!(paths(store, ns, Some("a")), vec!["a", "a/b", "a/c"]);
    assert_eq!(paths(store, ns, Some("a/")), vec!["a/b", "a/c"]);
    assert_eq!(store.get_count_by_prefix(ns, Some("a")).unwrap(), 3);
    assert_eq!(store.get_count_by_prefix(ns, Some("")).unwrap(), 4);

    // Existence probes
    let probe: Vec<String> = ["a", "x", "z"].iter().map(|p| p.to_string()).collect();
    let expected: HashSet<String> = ["a", "x"].iter().map(|p| p.to_string()).collect();
    assert_eq!(store.find_conflicts(ns, &probe).unwrap(), expected);

    // Namespace isolation
    assert!(!store.has_conflicts(None).unwrap());
    assert_eq!(store.get_conflict(None, "a").unwrap(), None);

    // Removal
    store.remove_by_prefix(ns, Some("a")).unwrap();
    assert_eq!(paths(store, ns, None), vec!["x"]);

    store.remove_conflicts(ns, &["x".to_string()]).unwrap();
    assert!(!store.has_conflicts(ns).unwrap());

    store.add_conflict(ns, &conflict("y")).unwrap();
    store.remove_namespace(ns).unwrap();
    assert!(!store.has_conflicts(ns).unwrap());
    assert_eq!(store.get_count_by_prefix(ns, None).unwrap(), 0);
}

// =============================================================================
// Discovery Tests
// =============================================================================

#[test]
fn test_find_providers_lists_builtins() {
    let manager = Arc::new(ConnectionManager::default());

    let names: Vec<String> = find_providers(&manager)
        .iter()
        .map(|p| p.name().to_string())
        .collect();

    assert_eq!(names, vec![LsmStorageProvider::NAME, HeapStorageProvider::NAME]);
    for provider in find_providers(&manager) {
        assert!(!provider.description().is_empty());
        assert_eq!(provider.version(), conflictdb::VERSION);
    }
}

#[test]
fn test_find_provider_by_name() {
    let manager = Arc::new(ConnectionManager::default());

    assert_eq!(find_provider(&manager, "heap").unwrap().name(), "heap");
    assert_eq!(find_provider(&manager, "lsm").unwrap().name(), "lsm");
    assert!(find_provider(&manager, "rocksdb").is_none());
}

// =============================================================================
// Contract Tests
// =============================================================================

#[test]
fn test_every_provider_honors_contract() {
    let dir = TempDir::new().unwrap();
    let manager = Arc::new(ConnectionManager::default());

    for provider in find_providers(&manager) {
        let base = dir.path().join(provider.name());
        std::fs::create_dir_all(&base).unwrap();

        let store = provider.open_conflicts(&base).unwrap();
        check_contract(store.as_ref());
    }
}

#[test]
fn test_lsm_provider_requires_base_dir() {
    let dir = TempDir::new().unwrap();
    let manager = Arc::new(ConnectionManager::default());

    let provider = find_provider(&manager, LsmStorageProvider::NAME).unwrap();
    assert!(provider.open_conflicts(&dir.path().join("missing")).is_err());
}
