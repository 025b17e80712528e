//! B+Tree page layout constants.

use strata_common::page::PAGE_SIZE;

/// Size of the header shared by leaf and internal pages.
///
/// page_type, key_size, lsn, size, max_size, parent_page_id, page_id:
/// seven 4-byte fields.
pub const BTREE_PAGE_HEADER_SIZE: usize = 28;

/// Leaf header: common header followed by next_page_id.
pub const LEAF_PAGE_HEADER_SIZE: usize = BTREE_PAGE_HEADER_SIZE + 4;

/// Internal pages carry no extra header fields.
pub const INTERNAL_PAGE_HEADER_SIZE: usize = BTREE_PAGE_HEADER_SIZE;

/// Size of a child pointer in an internal page.
pub const CHILD_ID_SIZE: usize = 4;

/// Size of a row id in a leaf page.
pub const ROW_ID_SIZE: usize = 8;

/// Maximum key size in bytes.
pub const MAX_KEY_SIZE: usize = 256;

/// Smallest usable leaf max_size.
pub const MIN_LEAF_MAX_SIZE: usize = 2;

/// Smallest usable internal max_size.
///
/// Keeps every non-root internal page at two or more children, so a child
/// always has a sibling to merge with or borrow from.
pub const MIN_INTERNAL_MAX_SIZE: usize = 4;

/// Number of (key, row id) pairs that fit in a leaf page.
pub const fn leaf_capacity(key_size: usize) -> usize {
    (PAGE_SIZE - LEAF_PAGE_HEADER_SIZE) / (key_size + ROW_ID_SIZE)
}

/// Number of (key, child id) pairs that fit in an internal page.
pub const fn internal_capacity(key_size: usize) -> usize {
    (PAGE_SIZE - INTERNAL_PAGE_HEADER_SIZE) / (key_size + CHILD_ID_SIZE)
}
