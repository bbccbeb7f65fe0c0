//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{ConflictError, Result};

use super::entry::{HEADER_SIZE, MAX_ENTRY_SIZE};
use super::WalEntry;

/// Reads entries from the WAL file, front to back
pub struct WalReader {
    reader: BufReader<File>,
    /// Offset just past the last fully read, valid entry
    position: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// Returns:
    /// - `Ok(Some(entry))` — a complete entry with a valid checksum
    /// - `Ok(None)` — clean end of file
    /// - `Err(WalCorruption)` — torn tail or checksum mismatch
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        let mut header = [0u8; HEADER_SIZE];
        let read = read_full(&mut self.reader, &mut header)?;
        if read == 0 {
            return Ok(None);
        }
        if read < HEADER_SIZE {
            return Err(ConflictError::WalCorruption(format!(
                "Torn header at offset {}: {} of {} bytes",
                self.position, read, HEADER_SIZE
            )));
        }

        let (lsn, crc, len) = WalEntry::parse_header(&header);
        if len > MAX_ENTRY_SIZE {
            return Err(ConflictError::WalCorruption(format!(
                "Implausible entry length {} at offset {}",
                len, self.position
            )));
        }

        let mut data = vec![0u8; len as usize];
        let read = read_full(&mut self.reader, &mut data)?;
        if read < data.len() {
            return Err(ConflictError::WalCorruption(format!(
                "Torn entry at offset {}: {} of {} data bytes",
                self.position, read, len
            )));
        }

        let entry = WalEntry::from_parts(lsn, crc, &data)?;
        self.position += (HEADER_SIZE + data.len()) as u64;
        Ok(Some(entry))
    }

    /// Offset just past the last valid entry read so far
    pub fn position(&self) -> u64 {
        self.position
    }
}

/// Fill `buf` as far as the file allows; returns bytes read
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
