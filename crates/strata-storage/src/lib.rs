//! Storage engine for strata.
//!
//! This crate provides:
//! - Disk manager for page-level file I/O with bitmap page allocation
//! - Row identifiers stored as index values
//! - B+ tree index over the buffer pool, with its roots directory
//! - A storage engine context tying disk, buffer pool and indexes together

mod bitmap;
mod btree;
mod disk;
mod engine;
mod row_id;

pub use bitmap::{BitmapPage, BITMAP_CAPACITY};
pub use btree::{
    bootstrap_roots_page, compare_keys, decode_u64_key, i64_key, internal_capacity,
    leaf_capacity, padded_key, u64_key, BPlusTree, BPlusTreeConfig, BTreePageHeader,
    BytewiseComparator, IndexIterator, IndexPageType, IndexRootsPage, InternalPage,
    KeyComparator, LeafPage, Node, TreePage, TreePageMut, TreeShape, BTREE_PAGE_HEADER_SIZE,
    INDEX_ROOTS_MAGIC, INTERNAL_PAGE_HEADER_SIZE, LEAF_PAGE_HEADER_SIZE, MAX_INDEX_ROOTS,
    MAX_KEY_SIZE,
};
pub use disk::{DiskManager, DiskManagerConfig, DISK_META_MAGIC, MAX_EXTENTS};
pub use engine::StorageEngine;
pub use row_id::RowId;
