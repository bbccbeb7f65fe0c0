//! SSTable Reader
//!
//! Opens SSTable files and provides O(log n) key lookups and ordered range
//! reads via an in-memory index.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::ops::Bound;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{ConflictError, Result};

use super::{le_u32, le_u64, FOOTER_SIZE, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER, VERSION};

/// Reader for SSTable files with in-memory index for O(log n) lookups
///
/// The file handle sits behind its own mutex so lookups take `&self` and
/// many readers can share one table.
pub struct SSTableReader {
    path: PathBuf,
    file: Mutex<BufReader<File>>,
    /// key → file offset of its entry
    index: BTreeMap<Vec<u8>, u64>,
    entry_count: u64,
}

impl SSTableReader {
    /// Open an SSTable for reading
    ///
    /// Validates header and data checksum, then loads the entire index into
    /// memory.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(ConflictError::Storage(format!(
                "SSTable {} too small: {} bytes",
                path.display(),
                file_size
            )));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..4] != MAGIC {
            return Err(ConflictError::Storage(format!(
                "Invalid SSTable magic: expected ATKV, got {:?}",
                &header[0..4]
            )));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(ConflictError::Storage(format!(
                "Unsupported SSTable version: {}",
                version
            )));
        }

        let entry_count = le_u64(&header, 6);

        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;

        let index_offset = le_u64(&footer, 0);
        let data_crc = le_u32(&footer, 8);

        if index_offset < HEADER_SIZE || index_offset > file_size - FOOTER_SIZE {
            return Err(ConflictError::Storage(format!(
                "SSTable {} has invalid index offset {}",
                path.display(),
                index_offset
            )));
        }

        // Data block checksum
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        let mut data = vec![0u8; (index_offset - HEADER_SIZE) as usize];
        file.read_exact(&mut data)?;
        if crc32fast::hash(&data) != data_crc {
            return Err(ConflictError::Storage(format!(
                "SSTable {} data checksum mismatch",
                path.display()
            )));
        }

        // Index block: [key_len(4)][offset(8)][key] until the footer
        let mut index_data = vec![0u8; (file_size - FOOTER_SIZE - index_offset) as usize];
        file.read_exact(&mut index_data)?;

        let mut index = BTreeMap::new();
        let mut pos = 0;
        while pos < index_data.len() {
            if pos + 12 > index_data.len() {
                return Err(ConflictError::Storage(format!(
                    "SSTable {} index block truncated",
                    path.display()
                )));
            }
            let key_len = le_u32(&index_data, pos) as usize;
            let offset = le_u64(&index_data, pos + 4);
            pos += 12;

            if pos + key_len > index_data.len() {
                return Err(ConflictError::Storage(format!(
                    "SSTable {} index key truncated",
                    path.display()
                )));
            }
            index.insert(index_data[pos..pos + key_len].to_vec(), offset);
            pos += key_len;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(BufReader::new(file)),
            index,
            entry_count,
        })
    }

    /// Get a value by key — O(log n) lookup via in-memory index
    ///
    /// Returns:
    /// - `Ok(Some(value))` — key found with value
    /// - `Ok(None)` — key found but is a tombstone (deleted)
    /// - `Err(KeyNotFound)` — key not in this SSTable
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let offset = match self.index.get(key) {
            Some(&off) => off,
            None => return Err(ConflictError::KeyNotFound),
        };

        let mut file = self.file.lock();
        Self::read_value_at(&mut file, offset)
    }

    /// Up to `limit` entries with keys after `start`, in key order.
    /// Tombstones are reported as `None` values.
    pub fn scan(
        &self,
        start: Bound<&[u8]>,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Option<Vec<u8>>)>> {
        let mut file = self.file.lock();
        let mut entries = Vec::new();
        for (key, &offset) in self.index.range::<[u8], _>((start, Bound::Unbounded)).take(limit) {
            let value = Self::read_value_at(&mut file, offset)?;
            entries.push((key.clone(), value));
        }
        Ok(entries)
    }

    /// Read the value of the entry at `offset`, skipping its key
    fn read_value_at(file: &mut BufReader<File>, offset: u64) -> Result<Option<Vec<u8>>> {
        file.seek(SeekFrom::Start(offset))?;

        let mut header = [0u8; 8];
        file.read_exact(&mut header)?;
        let key_len = le_u32(&header, 0);
        let val_len = le_u32(&header, 4);

        file.seek(SeekFrom::Current(key_len as i64))?;

        if val_len == TOMBSTONE_MARKER {
            return Ok(None);
        }

        let mut value = vec![0u8; val_len as usize];
        file.read_exact(&mut value)?;
        Ok(Some(value))
    }

    /// Get entry count
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Quick check if a key might be in this SSTable (range check)
    pub fn might_contain(&self, key: &[u8]) -> bool {
        match (self.index.keys().next(), self.index.keys().next_back()) {
            (Some(min), Some(max)) => key >= min.as_slice() && key <= max.as_slice(),
            _ => false,
        }
    }
}
