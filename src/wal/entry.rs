//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their framing.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{ConflictError, Result};

/// Header size: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Upper bound on a single entry's data section (64 MB).
/// Anything larger is treated as a corrupted length field.
pub const MAX_ENTRY_SIZE: u32 = 64 * 1024 * 1024;

/// A single entry in the WAL: one atomic write batch
#[derive(Debug, Clone, PartialEq)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The operations of the batch, applied in order
    pub operations: Vec<Operation>,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

impl Operation {
    /// The key this operation touches
    pub fn key(&self) -> &[u8] {
        match self {
            Operation::Put { key, .. } | Operation::Delete { key } => key,
        }
    }
}

/// Data section layout (bincode)
#[derive(Deserialize)]
struct Payload {
    operations: Vec<Operation>,
    timestamp: u64,
}

/// Borrowed twin of `Payload`; encodes to the same bytes
#[derive(Serialize)]
struct PayloadRef<'a> {
    operations: &'a [Operation],
    timestamp: u64,
}

impl WalEntry {
    /// Create a new entry stamped with the current time
    pub fn new(lsn: u64, operations: Vec<Operation>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            lsn,
            operations,
            timestamp,
        }
    }

    /// Serialize to the on-disk format: header + bincode payload
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let payload = PayloadRef {
            operations: &self.operations,
            timestamp: self.timestamp,
        };
        let data = bincode::serialize(&payload)?;

        if data.len() > MAX_ENTRY_SIZE as usize {
            return Err(ConflictError::Serialization(format!(
                "WAL entry too large: {} bytes (max {})",
                data.len(),
                MAX_ENTRY_SIZE
            )));
        }

        let mut bytes = Vec::with_capacity(HEADER_SIZE + data.len());
        bytes.extend_from_slice(&self.lsn.to_le_bytes());
        bytes.extend_from_slice(&Self::compute_crc(&data).to_le_bytes());
        bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&data);

        Ok(bytes)
    }

    /// Deserialize one complete entry (header + data)
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ConflictError::WalCorruption(format!(
                "Incomplete header: expected {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&bytes[..HEADER_SIZE]);
        let (lsn, crc, len) = Self::parse_header(&header);

        let data = &bytes[HEADER_SIZE..];
        if data.len() != len as usize {
            return Err(ConflictError::WalCorruption(format!(
                "Data length mismatch: header says {}, got {}",
                len,
                data.len()
            )));
        }

        Self::from_parts(lsn, crc, data)
    }

    /// Split a header into (lsn, crc, data_len)
    pub(crate) fn parse_header(header: &[u8; HEADER_SIZE]) -> (u64, u32, u32) {
        let mut lsn = [0u8; 8];
        let mut crc = [0u8; 4];
        let mut len = [0u8; 4];
        lsn.copy_from_slice(&header[0..8]);
        crc.copy_from_slice(&header[8..12]);
        len.copy_from_slice(&header[12..16]);
        (
            u64::from_le_bytes(lsn),
            u32::from_le_bytes(crc),
            u32::from_le_bytes(len),
        )
    }

    /// Verify the checksum and decode the data section
    pub(crate) fn from_parts(lsn: u64, crc: u32, data: &[u8]) -> Result<Self> {
        let actual = Self::compute_crc(data);
        if actual != crc {
            return Err(ConflictError::WalCorruption(format!(
                "CRC mismatch at lsn {}: expected {:08x}, got {:08x}",
                lsn, crc, actual
            )));
        }

        let payload: Payload = bincode::deserialize(data).map_err(|e| {
            ConflictError::WalCorruption(format!("Undecodable entry at lsn {}: {}", lsn, e))
        })?;

        Ok(Self {
            lsn,
            operations: payload.operations,
            timestamp: payload.timestamp,
        })
    }

    /// CRC32 of the data section
    pub fn compute_crc(data: &[u8]) -> u32 {
        crc32fast::hash(data)
    }
}
