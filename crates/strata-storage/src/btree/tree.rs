//! B+Tree index over the buffer pool.
//!
//! Keys are fixed-size byte strings ordered by a [`KeyComparator`], values
//! are [`RowId`]s, and keys are unique. Every page access goes through a
//! [`PageGuard`] lease, so a page is pinned exactly as long as a guard for
//! it is alive.
//!
//! Structural changes (splits, merges, redistribution, root changes) touch
//! several pages without latching them together. Callers serialize
//! mutations of one tree, which `&mut self` on [`BPlusTree::insert`] and
//! [`BPlusTree::remove`] enforces for a single handle. Each operation
//! reloads the root from the roots directory, so serialized calls through
//! several handles on one index id stay consistent.
//!
//! A split allocates all of its pages before touching the tree, so an
//! insert that runs out of frames or store space changes nothing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use strata_buffer::{BufferPool, PageGuard};
use strata_common::page::{PageId, INDEX_ROOTS_PAGE_ID};
use strata_common::{Result, StrataError};
use tracing::{debug, warn};

use super::constants::{
    internal_capacity, leaf_capacity, MAX_KEY_SIZE, MIN_INTERNAL_MAX_SIZE, MIN_LEAF_MAX_SIZE,
};
use super::internal::InternalPage;
use super::iterator::IndexIterator;
use super::key::{BytewiseComparator, KeyComparator};
use super::leaf::LeafPage;
use super::node::Node;
use super::roots::IndexRootsPage;
use super::types::{BTreePageHeader, IndexPageType, TreePage, TreePageMut};
use crate::row_id::RowId;

/// Shape of one B+Tree index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BPlusTreeConfig {
    /// Size of every key in bytes.
    pub key_size: usize,
    /// Entries per leaf before it splits. Defaults to what fits in a page.
    #[serde(default)]
    pub leaf_max_size: Option<usize>,
    /// Children per internal page before it splits. Defaults to what fits in a page.
    #[serde(default)]
    pub internal_max_size: Option<usize>,
}

impl Default for BPlusTreeConfig {
    fn default() -> Self {
        Self::new(8)
    }
}

impl BPlusTreeConfig {
    pub fn new(key_size: usize) -> Self {
        Self {
            key_size,
            leaf_max_size: None,
            internal_max_size: None,
        }
    }

    pub fn with_leaf_max_size(mut self, max_size: usize) -> Self {
        self.leaf_max_size = Some(max_size);
        self
    }

    pub fn with_internal_max_size(mut self, max_size: usize) -> Self {
        self.internal_max_size = Some(max_size);
        self
    }

    pub fn leaf_max_size(&self) -> usize {
        self.leaf_max_size
            .unwrap_or_else(|| leaf_capacity(self.key_size))
    }

    pub fn internal_max_size(&self) -> usize {
        self.internal_max_size
            .unwrap_or_else(|| internal_capacity(self.key_size))
    }

    /// Checks key size and fan-out limits.
    pub fn validate(&self) -> Result<()> {
        if self.key_size == 0 || self.key_size > MAX_KEY_SIZE {
            return Err(invalid("key_size", self.key_size));
        }
        let leaf = self.leaf_max_size();
        if leaf < MIN_LEAF_MAX_SIZE || leaf > leaf_capacity(self.key_size) {
            return Err(invalid("leaf_max_size", leaf));
        }
        let internal = self.internal_max_size();
        if internal < MIN_INTERNAL_MAX_SIZE || internal > internal_capacity(self.key_size) {
            return Err(invalid("internal_max_size", internal));
        }
        Ok(())
    }
}

fn invalid(name: &str, value: usize) -> StrataError {
    StrataError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn corrupted(msg: impl Into<String>) -> StrataError {
    StrataError::BTreeCorrupted(msg.into())
}

/// A unique B+Tree index stored in buffer pool pages.
pub struct BPlusTree {
    index_id: u32,
    pool: Arc<BufferPool>,
    comparator: Arc<dyn KeyComparator>,
    key_size: usize,
    leaf_max_size: usize,
    internal_max_size: usize,
    root_page_id: AtomicU32,
}

impl BPlusTree {
    /// Opens index `index_id`, reading its root from the roots directory.
    ///
    /// An index with no directory record starts empty; the record is
    /// created on the first insert.
    pub fn open(index_id: u32, pool: Arc<BufferPool>, config: BPlusTreeConfig) -> Result<Self> {
        Self::with_comparator(index_id, pool, config, Arc::new(BytewiseComparator))
    }

    /// Opens an index ordered by a custom comparator.
    pub fn with_comparator(
        index_id: u32,
        pool: Arc<BufferPool>,
        config: BPlusTreeConfig,
        comparator: Arc<dyn KeyComparator>,
    ) -> Result<Self> {
        config.validate()?;

        let tree = Self {
            index_id,
            pool,
            comparator,
            key_size: config.key_size,
            leaf_max_size: config.leaf_max_size(),
            internal_max_size: config.internal_max_size(),
            root_page_id: AtomicU32::new(PageId::INVALID.0),
        };

        let root = tree.refresh_root()?;
        if root.is_valid() {
            let header = tree.read_header(root)?;
            if header.key_size as usize != tree.key_size {
                return Err(StrataError::KeySizeMismatch {
                    expected: header.key_size as usize,
                    actual: tree.key_size,
                });
            }
        }
        debug!(index_id, root = %root, "opened index");
        Ok(tree)
    }

    pub fn index_id(&self) -> u32 {
        self.index_id
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn comparator(&self) -> &dyn KeyComparator {
        &*self.comparator
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    pub fn leaf_max_size(&self) -> usize {
        self.leaf_max_size
    }

    pub fn internal_max_size(&self) -> usize {
        self.internal_max_size
    }

    /// Root as of the last operation on this handle.
    pub fn root_page_id(&self) -> PageId {
        PageId(self.root_page_id.load(Ordering::Acquire))
    }

    pub fn is_empty(&self) -> bool {
        !self.root_page_id().is_valid()
    }

    /// Reloads the root from the roots directory.
    ///
    /// Every operation starts here, so handles sharing an index id see the
    /// splits and collapses made through each other.
    pub(crate) fn refresh_root(&self) -> Result<PageId> {
        let root = {
            let guard = self.pool.fetch_page(INDEX_ROOTS_PAGE_ID)?;
            let data = guard.data();
            IndexRootsPage::open(&*data)?
                .get_root_id(self.index_id)
                .unwrap_or(PageId::INVALID)
        };
        self.root_page_id.store(root.0, Ordering::Release);
        Ok(root)
    }

    fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.key_size {
            return Err(StrataError::KeySizeMismatch {
                expected: self.key_size,
                actual: key.len(),
            });
        }
        Ok(())
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Point lookup.
    pub fn get_value(&self, key: &[u8]) -> Result<Option<RowId>> {
        self.check_key(key)?;
        if !self.refresh_root()?.is_valid() {
            return Ok(None);
        }
        let leaf = self.find_leaf(Some(key))?;
        let data = leaf.data();
        let value = LeafPage::new(&*data).lookup(key, self.comparator());
        Ok(value)
    }

    /// Descends to the leaf covering `key`, or the leftmost leaf for None.
    ///
    /// Pins hand over hand: a child is fetched before its parent's lease is
    /// released.
    pub(crate) fn find_leaf(&self, key: Option<&[u8]>) -> Result<PageGuard<'_>> {
        let mut guard = self.pool.fetch_page(self.root_page_id())?;
        loop {
            let child = {
                let data = guard.data();
                let node = Node::open(&*data, guard.page_id())?;
                if node.key_size() != self.key_size {
                    return Err(StrataError::PageCorrupted {
                        page_id: guard.page_id().0,
                        reason: format!(
                            "key size {} in an index of key size {}",
                            node.key_size(),
                            self.key_size
                        ),
                    });
                }
                match node {
                    Node::Leaf(_) => None,
                    Node::Internal(page) if page.size() == 0 => {
                        return Err(corrupted(format!("{} has no children", guard.page_id())))
                    }
                    Node::Internal(page) => Some(match key {
                        Some(key) => page.lookup(key, self.comparator()),
                        None => page.value_at(0),
                    }),
                }
            };
            match child {
                None => return Ok(guard),
                Some(child) => guard = self.pool.fetch_page(child)?,
            }
        }
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    /// Cursor at the smallest key.
    pub fn begin(&self) -> Result<IndexIterator<'_>> {
        if !self.refresh_root()?.is_valid() {
            return Ok(self.end());
        }
        let leaf = self.find_leaf(None)?;
        IndexIterator::new(&self.pool, leaf, 0)
    }

    /// Cursor at the first key >= `key`.
    pub fn begin_at(&self, key: &[u8]) -> Result<IndexIterator<'_>> {
        self.check_key(key)?;
        if !self.refresh_root()?.is_valid() {
            return Ok(self.end());
        }
        let leaf = self.find_leaf(Some(key))?;
        let slot = {
            let data = leaf.data();
            LeafPage::new(&*data).key_index(key, self.comparator())
        };
        IndexIterator::new(&self.pool, leaf, slot)
    }

    /// The exhausted cursor.
    pub fn end(&self) -> IndexIterator<'_> {
        IndexIterator::end(&self.pool)
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    /// Inserts a unique key. Returns false if the key already exists.
    pub fn insert(&mut self, key: &[u8], row_id: RowId) -> Result<bool> {
        self.check_key(key)?;
        if !self.refresh_root()?.is_valid() {
            self.start_new_tree(key, row_id)?;
            return Ok(true);
        }
        self.insert_into_leaf(key, row_id)
    }

    fn start_new_tree(&self, key: &[u8], row_id: RowId) -> Result<()> {
        let mut guard = self.pool.new_page()?;
        let page_id = guard.page_id();
        {
            let mut data = guard.data_mut();
            let mut leaf = LeafPage::new(&mut *data);
            leaf.init(page_id, PageId::INVALID, self.key_size, self.leaf_max_size);
            leaf.insert(key, row_id, self.comparator());
        }
        drop(guard);

        if let Err(e) = self.update_root_page_id(page_id) {
            self.release_pages(&[page_id]);
            return Err(e);
        }
        debug!(index_id = self.index_id, root = page_id.0, "started new tree");
        Ok(())
    }

    fn insert_into_leaf(&self, key: &[u8], row_id: RowId) -> Result<bool> {
        let mut leaf = self.find_leaf(Some(key))?;
        let leaf_id = leaf.page_id();

        let (exists, full, parent_id) = {
            let data = leaf.data();
            let page = LeafPage::new(&*data);
            (
                page.lookup(key, self.comparator()).is_some(),
                page.size() >= page.max_size(),
                page.parent_page_id(),
            )
        };
        if exists {
            return Ok(false);
        }
        if !full {
            let mut data = leaf.data_mut();
            LeafPage::new(&mut *data).insert(key, row_id, self.comparator());
            return Ok(true);
        }

        let mut reserved = self.reserve_split_pages(parent_id)?;
        let mut sibling = match self.claim_page(&mut reserved) {
            Ok(guard) => guard,
            Err(e) => {
                self.release_pages(&reserved);
                return Err(e);
            }
        };
        let sibling_id = sibling.page_id();
        let separator = {
            let mut leaf_data = leaf.data_mut();
            let mut sibling_data = sibling.data_mut();
            let mut page = LeafPage::new(&mut *leaf_data);
            let mut new_page = LeafPage::new(&mut *sibling_data);

            new_page.init(sibling_id, parent_id, self.key_size, page.max_size());
            page.move_half_to(&mut new_page);
            new_page.set_next_page_id(page.next_page_id());
            page.set_next_page_id(sibling_id);

            if self.comparator.compare(key, new_page.key_at(0)).is_lt() {
                page.insert(key, row_id, self.comparator());
            } else {
                new_page.insert(key, row_id, self.comparator());
            }
            Bytes::copy_from_slice(new_page.key_at(0))
        };
        drop(sibling);
        drop(leaf);
        debug!(
            index_id = self.index_id,
            page_id = leaf_id.0,
            sibling = sibling_id.0,
            "split leaf"
        );

        let linked = self.insert_into_parent(leaf_id, &separator, sibling_id, &mut reserved);
        self.release_pages(&reserved);
        linked.map(|()| true)
    }

    /// Allocates every page a split of a full leaf under `parent_id` needs.
    ///
    /// That is one page for the new leaf, one per full ancestor, and one for
    /// a new root when every ancestor is full. Nothing is modified until all
    /// of them are allocated, so running out of frames or store space fails
    /// the insert with the tree unchanged.
    fn reserve_split_pages(&self, parent_id: PageId) -> Result<Vec<PageId>> {
        let mut needed = 1;
        let mut current = parent_id;
        while current.is_valid() {
            let header = self.read_header(current)?;
            if header.size < header.max_size {
                break;
            }
            needed += 1;
            current = header.parent_page_id;
        }
        if !current.is_valid() {
            needed += 1;
        }

        let mut reserved = Vec::with_capacity(needed);
        for _ in 0..needed {
            match self.pool.new_page() {
                Ok(guard) => reserved.push(guard.page_id()),
                Err(e) => {
                    self.release_pages(&reserved);
                    debug!(
                        index_id = self.index_id,
                        needed,
                        error = %e,
                        "could not reserve pages for split"
                    );
                    return Err(e);
                }
            }
        }
        // Claimed from the back, lowest id first.
        reserved.reverse();
        Ok(reserved)
    }

    /// Takes one reserved page for a split.
    fn claim_page(&self, reserved: &mut Vec<PageId>) -> Result<PageGuard<'_>> {
        let page_id = *reserved
            .last()
            .ok_or_else(|| StrataError::Internal("split used more pages than reserved".to_string()))?;
        let guard = self.pool.fetch_page(page_id)?;
        reserved.pop();
        Ok(guard)
    }

    /// Gives back pages that were allocated but never linked into the tree.
    fn release_pages(&self, pages: &[PageId]) {
        for &page_id in pages {
            match self.pool.delete_page(page_id) {
                Ok(true) => {}
                Ok(false) => warn!(page_id = page_id.0, "unused page is still pinned"),
                Err(e) => warn!(page_id = page_id.0, error = %e, "failed to release unused page"),
            }
        }
    }

    /// Links `new_id` into the tree as the right neighbour of `old_id`.
    fn insert_into_parent(
        &self,
        old_id: PageId,
        key: &[u8],
        new_id: PageId,
        reserved: &mut Vec<PageId>,
    ) -> Result<()> {
        let parent_id = self.read_header(old_id)?.parent_page_id;

        if !parent_id.is_valid() {
            let mut root = self.claim_page(reserved)?;
            let root_id = root.page_id();
            {
                let mut data = root.data_mut();
                let mut page = InternalPage::new(&mut *data);
                page.init(root_id, PageId::INVALID, self.key_size, self.internal_max_size);
                page.populate_new_root(old_id, key, new_id);
            }
            drop(root);

            self.adopt(&[old_id, new_id], root_id)?;
            self.update_root_page_id(root_id)?;
            debug!(index_id = self.index_id, root = root_id.0, "grew new root");
            return Ok(());
        }

        let mut parent = self.pool.fetch_page(parent_id)?;
        let full = {
            let data = parent.data();
            let page = InternalPage::open(&*data, parent_id)?;
            page.size() >= page.max_size()
        };

        if !full {
            {
                let mut data = parent.data_mut();
                InternalPage::new(&mut *data)
                    .insert_node_after(old_id, key, new_id)
                    .ok_or_else(|| corrupted(format!("{} is not a child of {}", old_id, parent_id)))?;
            }
            drop(parent);
            return self.adopt(&[new_id], parent_id);
        }

        let mut sibling = self.claim_page(reserved)?;
        let sibling_id = sibling.page_id();
        let (separator, moved, new_owner) = {
            let mut parent_data = parent.data_mut();
            let mut sibling_data = sibling.data_mut();
            let mut page = InternalPage::new(&mut *parent_data);
            let mut new_page = InternalPage::new(&mut *sibling_data);

            new_page.init(
                sibling_id,
                page.parent_page_id(),
                self.key_size,
                page.max_size(),
            );
            let moved = page.move_half_to(&mut new_page);
            let separator = Bytes::copy_from_slice(new_page.key_at(0));

            let (target, owner) = if self.comparator.compare(key, &separator).is_lt() {
                (&mut page, parent_id)
            } else {
                (&mut new_page, sibling_id)
            };
            target
                .insert_node_after(old_id, key, new_id)
                .ok_or_else(|| corrupted(format!("{} is not a child of {}", old_id, parent_id)))?;
            (separator, moved, owner)
        };
        drop(sibling);
        drop(parent);
        debug!(
            index_id = self.index_id,
            page_id = parent_id.0,
            sibling = sibling_id.0,
            "split internal page"
        );

        self.adopt(&moved, sibling_id)?;
        self.adopt(&[new_id], new_owner)?;
        self.insert_into_parent(parent_id, &separator, sibling_id, reserved)
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Removes `key`. Returns false if it was not present.
    pub fn remove(&mut self, key: &[u8]) -> Result<bool> {
        self.check_key(key)?;
        if !self.refresh_root()?.is_valid() {
            return Ok(false);
        }

        let mut leaf = self.find_leaf(Some(key))?;
        let leaf_id = leaf.page_id();
        let present = {
            let data = leaf.data();
            LeafPage::new(&*data).lookup(key, self.comparator()).is_some()
        };
        if !present {
            return Ok(false);
        }

        let underflow = {
            let mut data = leaf.data_mut();
            let mut page = LeafPage::new(&mut *data);
            page.remove(key, self.comparator());
            page.size() < page.min_size()
        };
        drop(leaf);

        if underflow {
            self.coalesce_or_redistribute(leaf_id)?;
        }
        Ok(true)
    }

    /// Restores occupancy of `node_id` after it fell below its minimum.
    ///
    /// Merges with a sibling when both fit in one page, otherwise borrows one
    /// entry from it. Merges may leave the parent underfull, in which case
    /// the parent is rebalanced the same way.
    fn coalesce_or_redistribute(&self, node_id: PageId) -> Result<()> {
        let parent_id = self.read_header(node_id)?.parent_page_id;
        if !parent_id.is_valid() {
            return self.adjust_root(node_id);
        }

        let mut parent = self.pool.fetch_page(parent_id)?;
        let (index, sibling_id, separator_index, separator) = {
            let data = parent.data();
            let page = InternalPage::open(&*data, parent_id)?;
            let index = page
                .value_index(node_id)
                .ok_or_else(|| corrupted(format!("{} is not a child of {}", node_id, parent_id)))?;
            let (sibling_index, separator_index) = if index == 0 { (1, 1) } else { (index - 1, index) };
            if sibling_index >= page.size() {
                return Err(corrupted(format!("{} has no sibling under {}", node_id, parent_id)));
            }
            (
                index,
                page.value_at(sibling_index),
                separator_index,
                Bytes::copy_from_slice(page.key_at(separator_index)),
            )
        };

        let node = self.pool.fetch_page(node_id)?;
        let sibling = self.pool.fetch_page(sibling_id)?;
        // The pair in key order; the node borrows from or merges with its neighbour.
        let (mut left, mut right) = if index == 0 {
            (node, sibling)
        } else {
            (sibling, node)
        };
        let (left_id, right_id) = (left.page_id(), right.page_id());

        let merge = {
            let left_data = left.data();
            let right_data = right.data();
            let left_node = Node::open(&*left_data, left_id)?;
            let right_node = Node::open(&*right_data, right_id)?;
            left_node.size() + right_node.size() < left_node.max_size()
        };

        if merge {
            let moved = {
                let mut left_data = left.data_mut();
                let mut right_data = right.data_mut();
                let mut left_node = Node::open(&mut *left_data, left_id)?;
                let mut right_node = Node::open(&mut *right_data, right_id)?;
                right_node.move_all_to(&mut left_node, &separator)?
            };
            drop(left);
            drop(right);
            self.adopt(&moved, left_id)?;

            let (parent_size, parent_min, parent_is_root) = {
                let mut data = parent.data_mut();
                let mut page = InternalPage::new(&mut *data);
                page.remove(separator_index);
                (page.size(), page.min_size(), page.is_root())
            };
            drop(parent);

            if !self.pool.delete_page(right_id)? {
                return Err(StrataError::Internal(format!(
                    "merged page {} is still pinned",
                    right_id
                )));
            }
            debug!(
                index_id = self.index_id,
                page_id = left_id.0,
                merged = right_id.0,
                "merged pages"
            );

            if parent_is_root {
                self.adjust_root(parent_id)?;
            } else if parent_size < parent_min {
                self.coalesce_or_redistribute(parent_id)?;
            }
            return Ok(());
        }

        let (moved, new_separator) = {
            let mut left_data = left.data_mut();
            let mut right_data = right.data_mut();
            let mut left_node = Node::open(&mut *left_data, left_id)?;
            let mut right_node = Node::open(&mut *right_data, right_id)?;
            let moved = if index == 0 {
                right_node
                    .move_first_to_end_of(&mut left_node, &separator)?
                    .map(|child| (child, left_id))
            } else {
                left_node
                    .move_last_to_front_of(&mut right_node, &separator)?
                    .map(|child| (child, right_id))
            };
            (moved, Bytes::copy_from_slice(right_node.first_key()))
        };
        drop(left);
        drop(right);

        {
            let mut data = parent.data_mut();
            InternalPage::new(&mut *data).set_key_at(separator_index, &new_separator);
        }
        drop(parent);

        if let Some((child, owner)) = moved {
            self.adopt(&[child], owner)?;
        }
        debug!(
            index_id = self.index_id,
            left = left_id.0,
            right = right_id.0,
            "redistributed entries"
        );
        Ok(())
    }

    /// Shrinks the tree at the root.
    ///
    /// An empty leaf root empties the tree; an internal root with a single
    /// child hands the root role to that child. Any other root is left alone.
    fn adjust_root(&self, root_id: PageId) -> Result<()> {
        enum Change {
            Keep,
            Empty,
            Promote(PageId),
        }

        let change = {
            let mut guard = self.pool.fetch_page(root_id)?;
            let header = self.read_header_of(&guard)?;
            match header.page_type {
                IndexPageType::Leaf if header.size == 0 => Change::Empty,
                IndexPageType::Internal if header.size == 1 => {
                    let mut data = guard.data_mut();
                    Change::Promote(InternalPage::new(&mut *data).remove_and_return_only_child())
                }
                _ => Change::Keep,
            }
        };

        match change {
            Change::Keep => return Ok(()),
            Change::Empty => {
                self.update_root_page_id(PageId::INVALID)?;
                debug!(index_id = self.index_id, "tree is now empty");
            }
            Change::Promote(child) => {
                self.adopt(&[child], PageId::INVALID)?;
                self.update_root_page_id(child)?;
                debug!(index_id = self.index_id, root = child.0, "collapsed root");
            }
        }

        if !self.pool.delete_page(root_id)? {
            return Err(StrataError::Internal(format!(
                "old root {} is still pinned",
                root_id
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Frees every page of the tree and drops its directory record.
    pub fn destroy(&mut self) -> Result<()> {
        let root = self.refresh_root()?;
        if root.is_valid() {
            self.destroy_subtree(root)?;
        }
        {
            let mut guard = self.pool.fetch_page(INDEX_ROOTS_PAGE_ID)?;
            let mut data = guard.data_mut();
            IndexRootsPage::open(&mut *data)?.delete(self.index_id);
        }
        self.root_page_id.store(PageId::INVALID.0, Ordering::Release);
        debug!(index_id = self.index_id, "destroyed index");
        Ok(())
    }

    fn destroy_subtree(&self, page_id: PageId) -> Result<()> {
        let children = {
            let guard = self.pool.fetch_page(page_id)?;
            let data = guard.data();
            Node::open(&*data, page_id)?.children()
        };
        for child in children {
            self.destroy_subtree(child)?;
        }
        if !self.pool.delete_page(page_id)? {
            return Err(StrataError::Internal(format!(
                "page {} is still pinned",
                page_id
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn read_header(&self, page_id: PageId) -> Result<BTreePageHeader> {
        let guard = self.pool.fetch_page(page_id)?;
        self.read_header_of(&guard)
    }

    fn read_header_of(&self, guard: &PageGuard<'_>) -> Result<BTreePageHeader> {
        let data = guard.data();
        let header = Node::open(&*data, guard.page_id())?.header();
        Ok(header)
    }

    /// Points the parent pointer of each child at `parent`.
    fn adopt(&self, children: &[PageId], parent: PageId) -> Result<()> {
        for &child in children {
            let mut guard = self.pool.fetch_page(child)?;
            let mut data = guard.data_mut();
            Node::open(&mut *data, child)?.set_parent_page_id(parent);
        }
        Ok(())
    }

    /// Records a new root in memory and in the roots directory.
    fn update_root_page_id(&self, root: PageId) -> Result<()> {
        {
            let mut guard = self.pool.fetch_page(INDEX_ROOTS_PAGE_ID)?;
            let mut data = guard.data_mut();
            let mut roots = IndexRootsPage::open(&mut *data)?;
            if !roots.update(self.index_id, root) && !roots.insert(self.index_id, root) {
                return Err(StrataError::OutOfSpace);
            }
        }
        self.root_page_id.store(root.0, Ordering::Release);
        Ok(())
    }
}

impl std::fmt::Debug for BPlusTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BPlusTree")
            .field("index_id", &self.index_id)
            .field("root_page_id", &self.root_page_id())
            .field("key_size", &self.key_size)
            .field("leaf_max_size", &self.leaf_max_size)
            .field("internal_max_size", &self.internal_max_size)
            .finish()
    }
}
