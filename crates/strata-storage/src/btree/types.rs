//! Shared header layout for B+Tree pages.
//!
//! Every index page starts with the same 28-byte header:
//! ```text
//! +----------------------+ 0
//! | page_type: u32       |
//! | key_size: u32        |
//! | lsn: u32             |
//! | size: u32            |  number of entries
//! | max_size: u32        |
//! | parent_page_id: u32  |
//! | page_id: u32         |
//! +----------------------+ 28
//! ```
//! All fields are little-endian.

use strata_common::page::{read_u32, write_u32, Lsn, PageId};
use strata_common::{Result, StrataError};

use super::constants::{
    BTREE_PAGE_HEADER_SIZE, CHILD_ID_SIZE,
    INTERNAL_PAGE_HEADER_SIZE, LEAF_PAGE_HEADER_SIZE, MAX_KEY_SIZE, ROW_ID_SIZE,
};

const PAGE_TYPE_OFFSET: usize = 0;
const KEY_SIZE_OFFSET: usize = 4;
const LSN_OFFSET: usize = 8;
const SIZE_OFFSET: usize = 12;
const MAX_SIZE_OFFSET: usize = 16;
const PARENT_OFFSET: usize = 20;
const PAGE_ID_OFFSET: usize = 24;

/// Kind of an index page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum IndexPageType {
    Invalid = 0,
    Leaf = 1,
    Internal = 2,
}

impl IndexPageType {
    /// Decodes a page type tag. Unknown tags map to Invalid.
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => IndexPageType::Leaf,
            2 => IndexPageType::Internal,
            _ => IndexPageType::Invalid,
        }
    }
}

/// Decoded copy of an index page header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BTreePageHeader {
    pub page_type: IndexPageType,
    pub key_size: u32,
    pub lsn: Lsn,
    pub size: u32,
    pub max_size: u32,
    pub parent_page_id: PageId,
    pub page_id: PageId,
}

impl BTreePageHeader {
    pub const SIZE: usize = BTREE_PAGE_HEADER_SIZE;

    /// Header of a freshly initialized, empty page.
    pub fn new(
        page_type: IndexPageType,
        page_id: PageId,
        parent_page_id: PageId,
        key_size: usize,
        max_size: usize,
    ) -> Self {
        Self {
            page_type,
            key_size: key_size as u32,
            lsn: 0,
            size: 0,
            max_size: max_size as u32,
            parent_page_id,
            page_id,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        write_u32(&mut buf, PAGE_TYPE_OFFSET, self.page_type as u32);
        write_u32(&mut buf, KEY_SIZE_OFFSET, self.key_size);
        write_u32(&mut buf, LSN_OFFSET, self.lsn);
        write_u32(&mut buf, SIZE_OFFSET, self.size);
        write_u32(&mut buf, MAX_SIZE_OFFSET, self.max_size);
        write_u32(&mut buf, PARENT_OFFSET, self.parent_page_id.0);
        write_u32(&mut buf, PAGE_ID_OFFSET, self.page_id.0);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Self {
        Self {
            page_type: IndexPageType::from_u32(read_u32(buf, PAGE_TYPE_OFFSET)),
            key_size: read_u32(buf, KEY_SIZE_OFFSET),
            lsn: read_u32(buf, LSN_OFFSET),
            size: read_u32(buf, SIZE_OFFSET),
            max_size: read_u32(buf, MAX_SIZE_OFFSET),
            parent_page_id: PageId::read_le(buf, PARENT_OFFSET),
            page_id: PageId::read_le(buf, PAGE_ID_OFFSET),
        }
    }
}

/// Reads the page type tag of an index page buffer.
#[inline]
pub fn page_type_of(buf: &[u8]) -> IndexPageType {
    IndexPageType::from_u32(read_u32(buf, PAGE_TYPE_OFFSET))
}

/// Read access to the common header of an index page view.
pub trait TreePage {
    /// The whole page buffer.
    fn bytes(&self) -> &[u8];

    fn header(&self) -> BTreePageHeader {
        BTreePageHeader::from_bytes(self.bytes())
    }

    fn page_type(&self) -> IndexPageType {
        page_type_of(self.bytes())
    }

    fn is_leaf(&self) -> bool {
        self.page_type() == IndexPageType::Leaf
    }

    fn key_size(&self) -> usize {
        read_u32(self.bytes(), KEY_SIZE_OFFSET) as usize
    }

    fn lsn(&self) -> Lsn {
        read_u32(self.bytes(), LSN_OFFSET)
    }

    /// Number of entries in the page.
    fn size(&self) -> usize {
        read_u32(self.bytes(), SIZE_OFFSET) as usize
    }

    fn max_size(&self) -> usize {
        read_u32(self.bytes(), MAX_SIZE_OFFSET) as usize
    }

    /// Fewest entries a non-root page may hold.
    fn min_size(&self) -> usize {
        self.max_size() / 2
    }

    fn parent_page_id(&self) -> PageId {
        PageId::read_le(self.bytes(), PARENT_OFFSET)
    }

    fn page_id(&self) -> PageId {
        PageId::read_le(self.bytes(), PAGE_ID_OFFSET)
    }

    fn is_root(&self) -> bool {
        !self.parent_page_id().is_valid()
    }
}

/// Write access to the common header of an index page view.
pub trait TreePageMut: TreePage {
    fn bytes_mut(&mut self) -> &mut [u8];

    fn write_header(&mut self, header: &BTreePageHeader) {
        self.bytes_mut()[..BTreePageHeader::SIZE].copy_from_slice(&header.to_bytes());
    }

    fn set_size(&mut self, size: usize) {
        write_u32(self.bytes_mut(), SIZE_OFFSET, size as u32);
    }

    fn set_parent_page_id(&mut self, parent: PageId) {
        write_u32(self.bytes_mut(), PARENT_OFFSET, parent.0);
    }
}

/// Decodes and checks the header of an index page buffer.
///
/// Rejects an unknown type tag, a tag other than `expected`, and size fields
/// that claim more entries than fit in the page, so no slot is ever read
/// past the end of the buffer.
pub(crate) fn check_header(
    buf: &[u8],
    page_id: PageId,
    expected: Option<IndexPageType>,
) -> Result<BTreePageHeader> {
    let corrupted = |reason: String| StrataError::PageCorrupted {
        page_id: page_id.0,
        reason,
    };

    if buf.len() < BTreePageHeader::SIZE {
        return Err(corrupted(format!("page buffer of {} bytes", buf.len())));
    }
    let header = BTreePageHeader::from_bytes(buf);
    if header.page_type == IndexPageType::Invalid {
        return Err(corrupted("not an index page".to_string()));
    }
    if let Some(expected) = expected {
        if header.page_type != expected {
            return Err(corrupted(format!(
                "expected {:?} index page, found {:?}",
                expected, header.page_type
            )));
        }
    }

    let key_size = header.key_size as usize;
    if key_size == 0 || key_size > MAX_KEY_SIZE {
        return Err(corrupted(format!("key size {}", key_size)));
    }
    let capacity = slots_in(buf.len(), header.page_type, key_size);
    if header.max_size as usize > capacity {
        return Err(corrupted(format!(
            "max size {} exceeds page capacity {}",
            header.max_size, capacity
        )));
    }
    if header.size > header.max_size {
        return Err(corrupted(format!(
            "size {} exceeds max size {}",
            header.size, header.max_size
        )));
    }
    Ok(header)
}

/// Number of entry slots a buffer of `len` bytes holds.
fn slots_in(len: usize, page_type: IndexPageType, key_size: usize) -> usize {
    let (header, entry) = match page_type {
        IndexPageType::Internal => (INTERNAL_PAGE_HEADER_SIZE, key_size + CHILD_ID_SIZE),
        _ => (LEAF_PAGE_HEADER_SIZE, key_size + ROW_ID_SIZE),
    };
    len.saturating_sub(header) / entry
}
