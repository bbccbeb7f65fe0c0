//! Record Codec
//!
//! ## Layout
//! ```text
//! ┌──────────┬──────────────┬────────────┬──────────────┬──────────┬────────────┐
//! │ Flags(1) │ PathLen(2,BE)│ Path(UTF-8)│ Ancestor(20)?│ Ours(20)?│ Theirs(20)?│
//! └──────────┴──────────────┴────────────┴──────────────┴──────────┴────────────┘
//! ```
//! Flag bit 0/1/2 marks ancestor/ours/theirs as present. Null ids are not
//! written and decode back to `ObjectId::NULL`. The engine frames values,
//! so the record has no length prefix of its own.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{ConflictError, Result};
use crate::model::{Conflict, ObjectId};

const HAS_ANCESTOR: u8 = 0b0000_0001;
const HAS_OURS: u8 = 0b0000_0010;
const HAS_THEIRS: u8 = 0b0000_0100;
const KNOWN_FLAGS: u8 = HAS_ANCESTOR | HAS_OURS | HAS_THEIRS;

/// Encode one conflict
pub fn encode_conflict(conflict: &Conflict) -> Result<Vec<u8>> {
    let path = conflict.path.as_bytes();
    let path_len = u16::try_from(path.len()).map_err(|_| {
        ConflictError::Codec(format!(
            "path of {} bytes exceeds the {} byte limit",
            path.len(),
            u16::MAX
        ))
    })?;

    let ids = [
        (HAS_ANCESTOR, &conflict.ancestor),
        (HAS_OURS, &conflict.ours),
        (HAS_THEIRS, &conflict.theirs),
    ];
    let flags = ids
        .iter()
        .filter(|(_, id)| !id.is_null())
        .fold(0u8, |flags, (bit, _)| flags | bit);

    let mut buf = BytesMut::with_capacity(1 + 2 + path.len() + 3 * ObjectId::NUM_BYTES);
    buf.put_u8(flags);
    buf.put_u16(path_len);
    buf.put_slice(path);
    for (bit, id) in ids {
        if flags & bit != 0 {
            buf.put_slice(id.as_bytes());
        }
    }

    Ok(buf.to_vec())
}

/// Decode one conflict; the whole input must be consumed
pub fn decode_conflict(mut bytes: &[u8]) -> Result<Conflict> {
    if bytes.remaining() < 3 {
        return Err(truncated("header", 3, bytes.remaining()));
    }
    let flags = bytes.get_u8();
    if flags & !KNOWN_FLAGS != 0 {
        return Err(ConflictError::Codec(format!(
            "unknown flag bits {:#010b}",
            flags
        )));
    }

    let path_len = bytes.get_u16() as usize;
    if bytes.remaining() < path_len {
        return Err(truncated("path", path_len, bytes.remaining()));
    }
    let path = std::str::from_utf8(&bytes[..path_len])
        .map_err(|e| ConflictError::Codec(format!("path is not valid UTF-8: {}", e)))?
        .to_string();
    bytes.advance(path_len);

    let mut read_id = |bit: u8, field: &str| -> Result<ObjectId> {
        if flags & bit == 0 {
            return Ok(ObjectId::NULL);
        }
        if bytes.remaining() < ObjectId::NUM_BYTES {
            return Err(truncated(field, ObjectId::NUM_BYTES, bytes.remaining()));
        }
        let id = ObjectId::from_slice(&bytes[..ObjectId::NUM_BYTES])?;
        bytes.advance(ObjectId::NUM_BYTES);
        Ok(id)
    };

    let ancestor = read_id(HAS_ANCESTOR, "ancestor")?;
    let ours = read_id(HAS_OURS, "ours")?;
    let theirs = read_id(HAS_THEIRS, "theirs")?;

    if bytes.has_remaining() {
        return Err(ConflictError::Codec(format!(
            "{} trailing bytes after conflict record for {:?}",
            bytes.remaining(),
            path
        )));
    }

    Ok(Conflict {
        path,
        ancestor,
        ours,
        theirs,
    })
}

fn truncated(field: &str, expected: usize, got: usize) -> ConflictError {
    ConflictError::Codec(format!(
        "truncated conflict record: {} needs {} bytes, {} left",
        field, expected, got
    ))
}
