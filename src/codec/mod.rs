//! Codec Module
//!
//! Byte-level encodings of the conflicts keyspace.
//!
//! - `key`: tree paths → ordered record keys, and the prefix predicate that
//!   emulates "all descendants of a tree" over a flat keyspace
//! - `record`: the binary layout of one stored conflict

pub mod key;
pub mod record;

pub use key::{child_prefix, is_prefix, key};
pub use record::{decode_conflict, encode_conflict};
