//! Tests for the Connection Manager
//!
//! These tests verify:
//! - One physical open per path, however many handles
//! - Close happens only on the last release
//! - Open options do not split one path into several connections
//! - Work handed to release_with runs only while the engine is shared
//! - Concurrent acquire/release races
//! - Foreign handles are rejected
//! - Open failures surface as StorageUnavailable

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use conflictdb::connection::{ConnectionManager, ConnectionStats, DbOptions};
use conflictdb::engine::WriteOptions;
use conflictdb::ConflictError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup() -> (TempDir, ConnectionManager, DbOptions) {
    let temp_dir = TempDir::new().unwrap();
    let options = DbOptions::new(temp_dir.path().join("db")).unwrap();
    (temp_dir, ConnectionManager::default(), options)
}

// =============================================================================
// Reference Counting Tests
// =============================================================================

#[test]
fn test_acquire_shares_one_engine() {
    let (_temp, manager, options) = setup();

    let first = manager.acquire(&options).unwrap();
    let second = manager.acquire(&options).unwrap();

    first.engine().put(b"k", b"v", &WriteOptions::default()).unwrap();
    assert_eq!(second.engine().get(b"k").unwrap(), Some(b"v".to_vec()));
    assert_eq!(
        manager.stats(),
        ConnectionStats {
            opened: 1,
            closed: 0,
            live: 1
        }
    );

    assert!(!manager.release(first).unwrap());
    assert!(manager.is_open(options.path()));

    assert!(manager.release(second).unwrap());
    assert!(!manager.is_open(options.path()));
    assert_eq!(manager.stats().closed, 1);
}

#[test]
fn test_reacquire_after_close_reopens() {
    let (_temp, manager, options) = setup();

    let handle = manager.acquire(&options).unwrap();
    handle.engine().put(b"k", b"v", &WriteOptions::default()).unwrap();
    assert!(manager.release(handle).unwrap());

    let handle = manager.acquire(&options).unwrap();
    assert_eq!(handle.engine().get(b"k").unwrap(), Some(b"v".to_vec()));
    assert_eq!(manager.stats().opened, 2);
    manager.release(handle).unwrap();
}

#[test]
fn test_create_flag_does_not_split_connection() {
    let (_temp, manager, options) = setup();
    let reader_options = options.clone().create_if_missing(false);

    let writer = manager.acquire(&options).unwrap();
    let reader = manager.acquire(&reader_options).unwrap();

    writer.engine().put(b"k", b"v", &WriteOptions::default()).unwrap();
    assert_eq!(reader.engine().get(b"k").unwrap(), Some(b"v".to_vec()));
    assert_eq!(manager.stats().opened, 1);
    assert_eq!(manager.stats().live, 1);

    // The reader is not the last reference
    assert!(!manager.release(reader).unwrap());
    assert!(manager.release(writer).unwrap());
    assert_eq!(manager.stats().closed, 1);
}

#[test]
fn test_release_with_runs_only_while_shared() {
    let (_temp, manager, options) = setup();
    let first = manager.acquire(&options).unwrap();
    let second = manager.acquire(&options).unwrap();

    let last = manager
        .release_with(first, |engine| engine.put(b"k", b"v", &WriteOptions::synced()))
        .unwrap();
    assert!(!last);
    assert_eq!(second.engine().get(b"k").unwrap(), Some(b"v".to_vec()));

    let ran = AtomicBool::new(false);
    let last = manager
        .release_with(second, |_| {
            ran.store(true, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    assert!(last);
    assert!(!ran.load(Ordering::SeqCst));
    assert!(!manager.is_open(options.path()));
}

#[test]
fn test_release_with_error_still_releases() {
    let (_temp, manager, options) = setup();
    let first = manager.acquire(&options).unwrap();
    let second = manager.acquire(&options).unwrap();

    let result = manager.release_with(first, |_| {
        Err(ConflictError::StorageIo("clear failed".to_string()))
    });
    assert!(matches!(result, Err(ConflictError::StorageIo(_))));

    // Only the second handle is left
    assert!(manager.release(second).unwrap());
    assert_eq!(manager.stats().live, 0);
}

#[test]
fn test_relative_path_is_made_absolute() {
    let options = DbOptions::new("relative/dir").unwrap();
    assert!(options.path().is_absolute());
    assert!(options.path().ends_with("relative/dir"));
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_acquire_release() {
    const THREADS: usize = 8;
    let (_temp, manager, options) = setup();
    let manager = Arc::new(manager);

    // Everyone acquires before anyone releases
    let acquired = Arc::new(Barrier::new(THREADS + 1));
    let release = Arc::new(Barrier::new(THREADS + 1));

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let options = options.clone();
            let acquired = Arc::clone(&acquired);
            let release = Arc::clone(&release);
            thread::spawn(move || {
                let handle = manager.acquire(&options).unwrap();
                acquired.wait();
                release.wait();
                manager.release(handle).unwrap()
            })
        })
        .collect();

    acquired.wait();
    assert_eq!(manager.stats().opened, 1);
    assert_eq!(manager.stats().closed, 0);
    release.wait();

    let last_count = workers
        .into_iter()
        .map(|w| w.join().unwrap())
        .filter(|&was_last| was_last)
        .count();

    // Exactly one releaser saw the count reach zero
    assert_eq!(last_count, 1);
    assert_eq!(
        manager.stats(),
        ConnectionStats {
            opened: 1,
            closed: 1,
            live: 0
        }
    );
}

#[test]
fn test_concurrent_acquire_with_mixed_options() {
    const THREADS: usize = 8;
    let (_temp, manager, options) = setup();
    std::fs::create_dir_all(options.path()).unwrap();
    let manager = Arc::new(manager);

    let start = Arc::new(Barrier::new(THREADS));
    let workers: Vec<_> = (0..THREADS)
        .map(|i| {
            let manager = Arc::clone(&manager);
            let options = options.clone().create_if_missing(i % 2 == 0);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                manager.acquire(&options).unwrap()
            })
        })
        .collect();
    let handles: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();

    assert_eq!(manager.stats().opened, 1);
    assert_eq!(manager.stats().live, 1);

    let last_count = handles
        .into_iter()
        .map(|handle| manager.release(handle).unwrap())
        .filter(|&was_last| was_last)
        .count();
    assert_eq!(last_count, 1);
}

#[test]
fn test_concurrent_distinct_paths_open_independently() {
    const PATHS: usize = 4;
    let temp_dir = TempDir::new().unwrap();
    let manager = Arc::new(ConnectionManager::default());

    let start = Arc::new(Barrier::new(PATHS));
    let workers: Vec<_> = (0..PATHS)
        .map(|i| {
            let manager = Arc::clone(&manager);
            let options = DbOptions::new(temp_dir.path().join(format!("db{}", i))).unwrap();
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                manager.acquire(&options).unwrap()
            })
        })
        .collect();
    let handles: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();

    assert_eq!(
        manager.stats(),
        ConnectionStats {
            opened: PATHS as u64,
            closed: 0,
            live: PATHS
        }
    );
    for handle in handles {
        assert!(manager.release(handle).unwrap());
    }
    assert_eq!(manager.stats().closed, PATHS as u64);
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_release_foreign_handle_rejected() {
    let (_temp, manager, options) = setup();
    let other = ConnectionManager::default();

    let foreign = other.acquire(&options).unwrap();
    let own = manager.acquire(&options).unwrap();

    // Same path, but handed out by another manager
    assert!(matches!(
        manager.release(foreign),
        Err(ConflictError::InvalidArgument(_))
    ));
    assert!(manager.is_open(options.path()));
    assert!(manager.release(own).unwrap());
}

#[test]
fn test_release_unregistered_handle_rejected() {
    let (_temp, manager, options) = setup();
    let other = ConnectionManager::default();

    let foreign = other.acquire(&options).unwrap();

    assert!(matches!(
        manager.release(foreign),
        Err(ConflictError::InvalidArgument(_))
    ));
    assert_eq!(manager.stats().closed, 0);
}

#[test]
fn test_open_missing_path_without_create() {
    let (temp, manager, _) = setup();
    let options = DbOptions::new(temp.path().join("missing"))
        .unwrap()
        .create_if_missing(false);

    let err = manager.acquire(&options).unwrap_err();

    assert!(matches!(err, ConflictError::StorageUnavailable { .. }));
    assert_eq!(manager.stats().opened, 0);
    assert!(!manager.is_open(options.path()));
}

#[test]
fn test_close_all_and_drop() {
    let (_temp, manager, options) = setup();

    let _a = manager.acquire(&options).unwrap();
    let _b = manager.acquire(&options).unwrap();
    manager.close_all();

    assert_eq!(manager.stats().live, 0);
    assert_eq!(manager.stats().closed, 1);
}
