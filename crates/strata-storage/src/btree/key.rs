//! Fixed-size index keys and their ordering.

use std::cmp::Ordering;

/// Total order over fixed-size index keys.
///
/// Both slices always have the tree's key size.
pub trait KeyComparator: Send + Sync {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Orders keys by their raw bytes (memcmp order).
#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseComparator;

impl KeyComparator for BytewiseComparator {
    #[inline]
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        compare_keys(a, b)
    }
}

/// Key comparison using u64 prefix for 8+ byte keys.
/// Falls back to slice comparison for shorter keys or when prefix matches.
#[inline(always)]
pub fn compare_keys(a: &[u8], b: &[u8]) -> Ordering {
    if a.len() >= 8 && b.len() >= 8 {
        let a_prefix = u64::from_be_bytes([a[0], a[1], a[2], a[3], a[4], a[5], a[6], a[7]]);
        let b_prefix = u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
        if a_prefix != b_prefix {
            return a_prefix.cmp(&b_prefix);
        }
        if a.len() == 8 && b.len() == 8 {
            return Ordering::Equal;
        }
    }
    a.cmp(b)
}

/// Encodes a u64 as an 8-byte key that sorts bytewise in numeric order.
#[inline]
pub fn u64_key(value: u64) -> [u8; 8] {
    value.to_be_bytes()
}

/// Encodes an i64 as an 8-byte key that sorts bytewise in numeric order.
#[inline]
pub fn i64_key(value: i64) -> [u8; 8] {
    ((value as u64) ^ (1 << 63)).to_be_bytes()
}

/// Decodes a key produced by [`u64_key`].
#[inline]
pub fn decode_u64_key(key: &[u8]) -> u64 {
    u64::from_be_bytes([
        key[0], key[1], key[2], key[3], key[4], key[5], key[6], key[7],
    ])
}

/// Right-pads `bytes` with zeros to `key_size`.
///
/// Returns None if `bytes` is longer than `key_size`.
pub fn padded_key(bytes: &[u8], key_size: usize) -> Option<Vec<u8>> {
    if bytes.len() > key_size {
        return None;
    }
    let mut key = vec![0u8; key_size];
    key[..bytes.len()].copy_from_slice(bytes);
    Some(key)
}
