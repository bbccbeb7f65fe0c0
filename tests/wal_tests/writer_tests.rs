//! Tests for WAL Writer
//!
//! These tests verify:
//! - Writing batches to the WAL
//! - LSN generation and sequencing, including across reopen
//! - Sync strategies (EveryWrite, EveryNEntries, forced sync)
//! - Truncation
//! - Integration with reader

use std::path::PathBuf;

use conflictdb::config::WalSyncStrategy;
use conflictdb::wal::{Operation, WalReader, WalWriter};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

fn put(key: &[u8], value: &[u8]) -> Operation {
    Operation::Put {
        key: key.to_vec(),
        value: value.to_vec(),
    }
}

fn read_all(path: &PathBuf) -> Vec<conflictdb::wal::WalEntry> {
    let mut reader = WalReader::open(path).unwrap();
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().unwrap() {
        entries.push(entry);
    }
    entries
}

// =============================================================================
// Basic Writing Tests
// =============================================================================

#[test]
fn test_lsn_sequential() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite, 1).unwrap();

    let lsns: Vec<u64> = (0..50)
        .map(|i| {
            writer
                .append(vec![put(format!("key{}", i).as_bytes(), b"v")], false)
                .unwrap()
        })
        .collect();

    for (i, lsn) in lsns.iter().enumerate() {
        assert_eq!(*lsn, (i + 1) as u64);
    }
    assert_eq!(writer.current_lsn(), 51);
}

#[test]
fn test_reopen_continues_from_next_lsn() {
    let (_temp, wal_path) = setup_temp_wal();

    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite, 1).unwrap();
        writer.append(vec![put(b"a", b"1")], false).unwrap();
        writer.append(vec![put(b"b", b"2")], false).unwrap();
    }

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite, 3).unwrap();
    assert_eq!(writer.append(vec![put(b"c", b"3")], false).unwrap(), 3);

    let entries = read_all(&wal_path);
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[2].lsn, 3);
}

// =============================================================================
// Sync Strategy Tests
// =============================================================================

#[test]
fn test_every_n_entries_sync() {
    let (_temp, wal_path) = setup_temp_wal();

    let strategy = WalSyncStrategy::EveryNEntries { count: 3 };
    let mut writer = WalWriter::open(&wal_path, strategy, 1).unwrap();

    writer.append(vec![put(b"a", b"1")], false).unwrap();
    writer.append(vec![put(b"b", b"2")], false).unwrap();
    assert_eq!(writer.uncommitted_count(), 2);

    writer.append(vec![put(b"c", b"3")], false).unwrap();
    assert_eq!(writer.uncommitted_count(), 0);
}

#[test]
fn test_forced_sync_overrides_strategy() {
    let (_temp, wal_path) = setup_temp_wal();

    let strategy = WalSyncStrategy::EveryNEntries { count: 100 };
    let mut writer = WalWriter::open(&wal_path, strategy, 1).unwrap();

    writer.append(vec![put(b"a", b"1")], false).unwrap();
    assert_eq!(writer.uncommitted_count(), 1);

    writer.append(vec![Operation::Delete { key: b"a".to_vec() }], true).unwrap();
    assert_eq!(writer.uncommitted_count(), 0);

    writer.append(vec![put(b"b", b"2")], false).unwrap();
    writer.sync().unwrap();
    assert_eq!(writer.uncommitted_count(), 0);
}

// =============================================================================
// Truncation Tests
// =============================================================================

#[test]
fn test_truncate_clears_entries_keeps_lsn() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite, 1).unwrap();
    for i in 0..5u8 {
        writer.append(vec![put(&[i], b"v")], false).unwrap();
    }

    writer.truncate().unwrap();
    assert!(read_all(&wal_path).is_empty());

    // LSNs keep increasing across truncations
    assert_eq!(writer.append(vec![put(b"z", b"v")], false).unwrap(), 6);
    let entries = read_all(&wal_path);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].lsn, 6);
}

// =============================================================================
// Reader Integration Tests
// =============================================================================

#[test]
fn test_reader_sees_batches_in_order() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite, 1).unwrap();
    writer
        .append(vec![put(b"a", b"1"), put(b"b", b"2")], false)
        .unwrap();
    writer
        .append(vec![Operation::Delete { key: b"a".to_vec() }], false)
        .unwrap();

    let mut reader = WalReader::open(&wal_path).unwrap();
    let first = reader.next_entry().unwrap().unwrap();
    assert_eq!(first.lsn, 1);
    assert_eq!(first.operations, vec![put(b"a", b"1"), put(b"b", b"2")]);

    let second = reader.next_entry().unwrap().unwrap();
    assert_eq!(second.operations, vec![Operation::Delete { key: b"a".to_vec() }]);

    assert!(reader.next_entry().unwrap().is_none());
}
