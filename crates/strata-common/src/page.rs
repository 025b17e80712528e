//! Page identifiers and layout constants shared by the strata crates.

use serde::{Deserialize, Serialize};

/// Size of every page and disk block in bytes (4 KB).
pub const PAGE_SIZE: usize = 4096;

/// Logical page holding the index roots directory.
pub const INDEX_ROOTS_PAGE_ID: PageId = PageId(0);

/// Log sequence number carried in index page headers.
pub type Lsn = u32;

/// Logical identifier of a page.
///
/// Page ids are dense non-negative integers handed out by the block store.
/// `PageId::INVALID` marks "no page" (an empty tree root, the last leaf's
/// sibling pointer, a root's parent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(pub u32);

impl PageId {
    /// Sentinel for "no page".
    pub const INVALID: PageId = PageId(u32::MAX);

    /// Creates a new PageId.
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns true unless this is the invalid sentinel.
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Returns the raw integer value.
    #[inline]
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Serializes to the 4-byte on-page representation.
    #[inline]
    pub fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// Reads the 4-byte on-page representation at `offset`.
    #[inline]
    pub fn read_le(buf: &[u8], offset: usize) -> Self {
        Self(read_u32(buf, offset))
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "page:{}", self.0)
        } else {
            write!(f, "page:invalid")
        }
    }
}

/// Reads a little-endian u32 at `offset`.
#[inline]
pub fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

/// Writes a little-endian u32 at `offset`.
#[inline]
pub fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
