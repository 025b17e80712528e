//! Disk-resident B+Tree index.
//!
//! The tree lives in buffer pool pages. Each page is read and written
//! through a view type over the page bytes:
//!
//! ```text
//!                 [InternalPage]            (key, child id) pairs
//!                /      |       \
//!        [LeafPage] -> [LeafPage] -> [LeafPage]   (key, row id) pairs,
//!                                                 chained left to right
//! ```
//!
//! - `types`: the 28-byte header shared by both page kinds
//! - `leaf` / `internal`: the page views with their split, merge and
//!   redistribution primitives
//! - `node`: a leaf-or-internal wrapper so rebalancing is written once
//! - `roots`: the directory page mapping index ids to root pages
//! - `tree`: search, insertion with split propagation, deletion with
//!   merge/redistribute and root collapse
//! - `iterator`: forward cursor along the leaf chain
//! - `verify`: whole-tree invariant checks

mod constants;
mod internal;
mod iterator;
mod key;
mod leaf;
mod node;
mod roots;
mod tree;
mod types;
mod verify;

pub use constants::{
    internal_capacity, leaf_capacity, BTREE_PAGE_HEADER_SIZE, INTERNAL_PAGE_HEADER_SIZE,
    LEAF_PAGE_HEADER_SIZE, MAX_KEY_SIZE,
};
pub use internal::InternalPage;
pub use iterator::IndexIterator;
pub use key::{
    compare_keys, decode_u64_key, i64_key, padded_key, u64_key, BytewiseComparator,
    KeyComparator,
};
pub use leaf::LeafPage;
pub use node::Node;
pub use roots::{bootstrap_roots_page, IndexRootsPage, INDEX_ROOTS_MAGIC, MAX_INDEX_ROOTS};
pub use tree::{BPlusTree, BPlusTreeConfig};
pub use types::{BTreePageHeader, IndexPageType, TreePage, TreePageMut};
pub use verify::TreeShape;
