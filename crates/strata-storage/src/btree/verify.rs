//! Structural checks for a B+Tree.

use std::cmp::Ordering;

use bytes::Bytes;
use strata_common::page::PageId;
use strata_common::{Result, StrataError};

use super::internal::InternalPage;
use super::key::KeyComparator;
use super::leaf::LeafPage;
use super::node::Node;
use super::tree::BPlusTree;
use super::types::TreePage;

/// Summary of a tree that passed [`BPlusTree::verify`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeShape {
    /// Number of levels, 0 for an empty tree.
    pub height: usize,
    pub leaf_pages: usize,
    pub internal_pages: usize,
    /// Number of (key, row id) entries.
    pub entries: usize,
}

struct LeafInfo {
    page_id: PageId,
    next: PageId,
    depth: usize,
}

struct Walk<'t> {
    tree: &'t BPlusTree,
    leaves: Vec<LeafInfo>,
    shape: TreeShape,
}

fn violation(page_id: PageId, what: impl std::fmt::Display) -> StrataError {
    StrataError::BTreeCorrupted(format!("{}: {}", page_id, what))
}

impl Walk<'_> {
    fn cmp(&self) -> &dyn KeyComparator {
        self.tree.comparator()
    }

    fn in_bounds(&self, key: &[u8], lower: Option<&Bytes>, upper: Option<&Bytes>) -> bool {
        lower.map_or(true, |lo| self.cmp().compare(key, lo) != Ordering::Less)
            && upper.map_or(true, |hi| self.cmp().compare(key, hi) == Ordering::Less)
    }

    fn visit(
        &mut self,
        page_id: PageId,
        parent: PageId,
        lower: Option<Bytes>,
        upper: Option<Bytes>,
        depth: usize,
    ) -> Result<()> {
        let guard = self.tree.pool().fetch_page(page_id)?;
        let data = guard.data();
        let node = Node::open(&*data, page_id)?;

        if node.page_id() != page_id {
            return Err(violation(page_id, format!("header names {}", node.page_id())));
        }
        if node.parent_page_id() != parent {
            return Err(violation(
                page_id,
                format!("parent is {}, expected {}", node.parent_page_id(), parent),
            ));
        }
        if node.key_size() != self.tree.key_size() {
            return Err(violation(page_id, format!("key size {}", node.key_size())));
        }
        let size = node.size();
        if size > node.max_size() {
            return Err(violation(page_id, format!("size {} over max {}", size, node.max_size())));
        }
        let is_root = !parent.is_valid();
        if !is_root && size < node.min_size() {
            return Err(violation(page_id, format!("size {} under min {}", size, node.min_size())));
        }

        match node {
            Node::Leaf(leaf) => {
                if size == 0 {
                    return Err(violation(page_id, "empty leaf"));
                }
                self.check_leaf(&leaf, lower.as_ref(), upper.as_ref())?;
                self.leaves.push(LeafInfo {
                    page_id,
                    next: leaf.next_page_id(),
                    depth,
                });
                self.shape.leaf_pages += 1;
                self.shape.entries += size;
                Ok(())
            }
            Node::Internal(internal) => {
                if is_root && size < 2 {
                    return Err(violation(page_id, "internal root with fewer than two children"));
                }
                let children = self.check_internal(&internal, lower.as_ref(), upper.as_ref())?;
                drop(data);
                drop(guard);
                self.shape.internal_pages += 1;

                let count = children.len();
                for (i, (child, child_lower)) in children.iter().enumerate() {
                    let child_upper = if i + 1 < count {
                        children[i + 1].1.clone()
                    } else {
                        upper.clone()
                    };
                    let child_lower = child_lower.clone().or_else(|| lower.clone());
                    self.visit(*child, page_id, child_lower, child_upper, depth + 1)?;
                }
                Ok(())
            }
        }
    }

    fn check_leaf(
        &self,
        leaf: &LeafPage<&[u8]>,
        lower: Option<&Bytes>,
        upper: Option<&Bytes>,
    ) -> Result<()> {
        let page_id = leaf.page_id();
        for i in 0..leaf.size() {
            let key = leaf.key_at(i);
            if i > 0 && self.cmp().compare(leaf.key_at(i - 1), key) != Ordering::Less {
                return Err(violation(page_id, format!("keys out of order at slot {}", i)));
            }
            if !self.in_bounds(key, lower, upper) {
                return Err(violation(page_id, format!("key at slot {} outside parent range", i)));
            }
        }
        Ok(())
    }

    /// Returns each child with the lower bound its separator imposes
    /// (None for slot 0).
    fn check_internal(
        &self,
        page: &InternalPage<&[u8]>,
        lower: Option<&Bytes>,
        upper: Option<&Bytes>,
    ) -> Result<Vec<(PageId, Option<Bytes>)>> {
        let page_id = page.page_id();
        let mut children = Vec::with_capacity(page.size());
        children.push((page.value_at(0), None));
        for i in 1..page.size() {
            let key = page.key_at(i);
            if i > 1 && self.cmp().compare(page.key_at(i - 1), key) != Ordering::Less {
                return Err(violation(page_id, format!("separators out of order at slot {}", i)));
            }
            if !self.in_bounds(key, lower, upper) {
                return Err(violation(page_id, format!("separator at slot {} outside parent range", i)));
            }
            children.push((page.value_at(i), Some(Bytes::copy_from_slice(key))));
        }
        Ok(children)
    }
}

impl BPlusTree {
    /// Walks the whole tree and checks its invariants.
    ///
    /// Checks key order within and across pages, size bounds for non-root
    /// pages, parent pointers, equal leaf depth and that the leaf chain
    /// visits every leaf once, left to right. Returns `BTreeCorrupted` on the
    /// first violation.
    pub fn verify(&self) -> Result<TreeShape> {
        let root = self.refresh_root()?;
        if !root.is_valid() {
            return Ok(TreeShape::default());
        }

        let mut walk = Walk {
            tree: self,
            leaves: Vec::new(),
            shape: TreeShape::default(),
        };
        walk.visit(root, PageId::INVALID, None, None, 1)?;

        let height = walk.leaves.first().map_or(0, |leaf| leaf.depth);
        if let Some(leaf) = walk.leaves.iter().find(|leaf| leaf.depth != height) {
            return Err(violation(
                leaf.page_id,
                format!("leaf at depth {}, expected {}", leaf.depth, height),
            ));
        }
        for pair in walk.leaves.windows(2) {
            if pair[0].next != pair[1].page_id {
                return Err(violation(
                    pair[0].page_id,
                    format!("next leaf is {}, expected {}", pair[0].next, pair[1].page_id),
                ));
            }
        }
        if let Some(last) = walk.leaves.last() {
            if last.next.is_valid() {
                return Err(violation(last.page_id, "last leaf has a successor"));
            }
        }

        walk.shape.height = height;
        Ok(walk.shape)
    }
}
