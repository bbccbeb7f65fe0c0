//! Tests for SSTable implementation
//!
//! These tests verify:
//! - SSTable creation and writing
//! - O(log n) key lookups via in-memory index
//! - Tombstone handling
//! - Ordered range reads with bounds and limits
//! - File format validation (magic, checksum)

use std::fs;
use std::ops::Bound;
use std::path::PathBuf;

use conflictdb::storage::{SSTable, SSTableBuilder, SSTableReader};
use conflictdb::ConflictError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_sstable() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.sst");
    (temp_dir, path)
}

/// Create an SSTable with numbered entries; every third key is a tombstone
fn create_sstable_with_entries(path: &PathBuf, count: usize) -> SSTable {
    let mut builder = SSTableBuilder::new(path).unwrap();
    for i in 0..count {
        let key = format!("key{:05}", i); // Zero-padded for lexicographic order
        let value = format!("value{}", i);
        let value = (i % 3 != 2).then_some(value.as_bytes());
        builder.add(key.as_bytes(), value).unwrap();
    }
    builder.finish().unwrap()
}

// =============================================================================
// SSTableBuilder Tests
// =============================================================================

#[test]
fn test_builder_metadata() {
    let (_temp, path) = setup_temp_sstable();

    let sstable = create_sstable_with_entries(&path, 5);

    assert!(path.exists());
    assert_eq!(sstable.entry_count, 5);
    assert_eq!(sstable.min_key, b"key00000".to_vec());
    assert_eq!(sstable.max_key, b"key00004".to_vec());
    assert_eq!(sstable.file_size, fs::metadata(&path).unwrap().len());
}

#[test]
fn test_builder_rejects_unsorted_keys() {
    let (_temp, path) = setup_temp_sstable();

    let mut builder = SSTableBuilder::new(&path).unwrap();
    builder.add(b"b", Some(b"1")).unwrap();

    assert!(builder.add(b"a", Some(b"2")).is_err());
    assert!(builder.add(b"b", Some(b"3")).is_err());
}

#[test]
fn test_empty_sstable_round_trip() {
    let (_temp, path) = setup_temp_sstable();

    SSTableBuilder::new(&path).unwrap().finish().unwrap();
    let reader = SSTableReader::open(&path).unwrap();

    assert_eq!(reader.entry_count(), 0);
    assert!(!reader.might_contain(b"anything"));
    assert!(reader.scan(Bound::Unbounded, 10).unwrap().is_empty());
}

// =============================================================================
// SSTableReader Lookup Tests
// =============================================================================

#[test]
fn test_reader_get_values_and_tombstones() {
    let (_temp, path) = setup_temp_sstable();
    create_sstable_with_entries(&path, 10);

    let reader = SSTableReader::open(&path).unwrap();

    assert_eq!(reader.entry_count(), 10);
    assert_eq!(reader.get(b"key00000").unwrap(), Some(b"value0".to_vec()));
    assert_eq!(reader.get(b"key00004").unwrap(), Some(b"value4".to_vec()));
    // Tombstone: present in the table, no value
    assert_eq!(reader.get(b"key00002").unwrap(), None);
    // Absent from the table entirely
    assert!(matches!(
        reader.get(b"key99999"),
        Err(ConflictError::KeyNotFound)
    ));
}

#[test]
fn test_might_contain_range() {
    let (_temp, path) = setup_temp_sstable();
    create_sstable_with_entries(&path, 10);

    let reader = SSTableReader::open(&path).unwrap();

    assert!(reader.might_contain(b"key00005"));
    assert!(!reader.might_contain(b"a"));
    assert!(!reader.might_contain(b"zzz"));
}

// =============================================================================
// SSTableReader Scan Tests
// =============================================================================

#[test]
fn test_scan_bounds_and_limit() {
    let (_temp, path) = setup_temp_sstable();
    create_sstable_with_entries(&path, 10);

    let reader = SSTableReader::open(&path).unwrap();

    let from_three = reader.scan(Bound::Included(b"key00003".as_slice()), 3).unwrap();
    let keys: Vec<&[u8]> = from_three.iter().map(|(k, _)| k.as_slice()).collect();
    assert_eq!(keys, vec![b"key00003".as_slice(), b"key00004", b"key00005"]);
    assert_eq!(from_three[2].1, None); // key00005 is a tombstone

    let after_three = reader.scan(Bound::Excluded(b"key00003".as_slice()), 1).unwrap();
    assert_eq!(after_three[0].0, b"key00004".to_vec());

    let tail = reader.scan(Bound::Included(b"key00008".as_slice()), 100).unwrap();
    assert_eq!(tail.len(), 2);
}

// =============================================================================
// File Format Validation Tests
// =============================================================================

#[test]
fn test_open_rejects_bad_magic() {
    let (_temp, path) = setup_temp_sstable();
    create_sstable_with_entries(&path, 3);

    let mut bytes = fs::read(&path).unwrap();
    bytes[0] = b'X';
    fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        SSTableReader::open(&path),
        Err(ConflictError::Storage(_))
    ));
}

#[test]
fn test_open_rejects_corrupted_data_block() {
    let (_temp, path) = setup_temp_sstable();
    create_sstable_with_entries(&path, 3);

    let mut bytes = fs::read(&path).unwrap();
    // First byte of the first record's value (header 14 + lens 8 + key 8)
    bytes[30] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        SSTableReader::open(&path),
        Err(ConflictError::Storage(_))
    ));
}

#[test]
fn test_open_rejects_truncated_file() {
    let (_temp, path) = setup_temp_sstable();
    fs::write(&path, b"ATKV").unwrap();

    assert!(SSTableReader::open(&path).is_err());
}
