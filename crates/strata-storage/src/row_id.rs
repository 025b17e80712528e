//! Row identifiers stored as index values.

use serde::{Deserialize, Serialize};
use strata_common::page::{read_u32, PageId};

/// Location of a row in the table heap.
///
/// The index stores these as opaque 8-byte values: the heap page holding
/// the row followed by the slot number within that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowId {
    /// Page containing the row.
    pub page_id: PageId,
    /// Slot number within the page.
    pub slot: u32,
}

impl RowId {
    /// Size of the on-page encoding in bytes.
    pub const SIZE: usize = 8;

    /// Invalid row ID.
    pub const INVALID: RowId = RowId {
        page_id: PageId::INVALID,
        slot: u32::MAX,
    };

    /// Creates a new row ID.
    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }

    /// Returns true if this is a valid row ID.
    pub fn is_valid(&self) -> bool {
        self.page_id.is_valid()
    }

    /// Serializes to the on-page encoding.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.page_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.slot.to_le_bytes());
        buf
    }

    /// Deserializes from the on-page encoding.
    pub fn from_bytes(buf: &[u8]) -> Self {
        Self {
            page_id: PageId::read_le(buf, 0),
            slot: read_u32(buf, 4),
        }
    }
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.page_id.0, self.slot)
    }
}
