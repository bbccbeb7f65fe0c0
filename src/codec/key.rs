//! Key Codec
//!
//! A record key is the exact UTF-8 encoding of its path. The children of a
//! tree `p` all share the prefix `p + "/"`. Because a string sorts before
//! any longer string it prefixes, the key of `p` itself sorts before the
//! whole range of its children, and prefix scans report the tree node ahead
//! of its descendants without any merging.

/// Path separator of tree paths
pub const SEPARATOR: char = '/';

/// Record key of `path`
pub fn key(path: &str) -> Vec<u8> {
    path.as_bytes().to_vec()
}

/// Key prefix shared by every descendant of `path`
pub fn child_prefix(path: &str) -> Vec<u8> {
    let mut prefix = key(path);
    if !path.ends_with(SEPARATOR) {
        prefix.push(SEPARATOR as u8);
    }
    prefix
}

/// `key` starts with `prefix`. `None` or an empty prefix matches every key.
pub fn is_prefix(prefix: Option<&[u8]>, key: &[u8]) -> bool {
    match prefix {
        None => true,
        Some(prefix) => key.len() >= prefix.len() && &key[..prefix.len()] == prefix,
    }
}
