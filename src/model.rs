//! Conflict data model
//!
//! `ObjectId` is a 20-byte content hash; `Conflict` is one unresolved
//! three-way merge at a tree path.

use std::fmt;
use std::str::FromStr;

use crate::error::{ConflictError, Result};

/// A 20-byte content hash. The all-zero value is the null id ("no object").
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjectId([u8; ObjectId::NUM_BYTES]);

impl ObjectId {
    /// Length of the raw hash
    pub const NUM_BYTES: usize = 20;

    /// The null object id
    pub const NULL: ObjectId = ObjectId([0u8; Self::NUM_BYTES]);

    pub const fn from_raw(raw: [u8; Self::NUM_BYTES]) -> Self {
        Self(raw)
    }

    /// Copy an id out of exactly `NUM_BYTES` bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; Self::NUM_BYTES] = bytes.try_into().map_err(|_| {
            ConflictError::InvalidArgument(format!(
                "object id needs {} bytes, got {}",
                Self::NUM_BYTES,
                bytes.len()
            ))
        })?;
        Ok(Self(raw))
    }

    /// Parse 40 hex characters
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| ConflictError::InvalidArgument(format!("invalid object id {:?}: {}", s, e)))?;
        Self::from_slice(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn is_null(&self) -> bool {
        self.0 == [0u8; Self::NUM_BYTES]
    }

    pub fn as_bytes(&self) -> &[u8; Self::NUM_BYTES] {
        &self.0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", &self.to_hex()[..8])
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = ConflictError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl From<[u8; ObjectId::NUM_BYTES]> for ObjectId {
    fn from(raw: [u8; ObjectId::NUM_BYTES]) -> Self {
        Self(raw)
    }
}

/// An unresolved merge at `path`: the ancestor, ours and theirs object ids.
/// A null id means that side had no object at the path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Conflict {
    pub path: String,
    pub ancestor: ObjectId,
    pub ours: ObjectId,
    pub theirs: ObjectId,
}

impl Conflict {
    pub fn new(path: impl Into<String>, ancestor: ObjectId, ours: ObjectId, theirs: ObjectId) -> Self {
        Self {
            path: path.into(),
            ancestor,
            ours,
            theirs,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}\t{}", self.path, self.ancestor, self.ours, self.theirs)
    }
}
