//! Kind-agnostic tree node used by rebalancing.
//!
//! Merge and redistribution walk up the tree without caring whether the
//! page at each level is a leaf or an internal page. `Node` dispatches to
//! the right page view and reports which children changed owner, so the
//! caller can fix their parent pointers.

use strata_common::page::PageId;
use strata_common::{Result, StrataError};

use super::internal::InternalPage;
use super::leaf::LeafPage;
use super::types::{check_header, IndexPageType, TreePage, TreePageMut};

/// A leaf or internal page view.
pub enum Node<B> {
    Leaf(LeafPage<B>),
    Internal(InternalPage<B>),
}

impl<B: AsRef<[u8]>> Node<B> {
    /// Opens a page buffer according to its type tag.
    ///
    /// The header is checked first, so a page with a bad tag or impossible
    /// size fields is `PageCorrupted`.
    pub fn open(data: B, page_id: PageId) -> Result<Self> {
        match check_header(data.as_ref(), page_id, None)?.page_type {
            IndexPageType::Internal => Ok(Node::Internal(InternalPage::new(data))),
            _ => Ok(Node::Leaf(LeafPage::new(data))),
        }
    }

    /// First key of the page. For internal pages this is the slot 0 key.
    pub fn first_key(&self) -> &[u8] {
        match self {
            Node::Leaf(leaf) => leaf.key_at(0),
            Node::Internal(internal) => internal.key_at(0),
        }
    }

    /// Children of an internal page, empty for a leaf.
    pub fn children(&self) -> Vec<PageId> {
        match self {
            Node::Leaf(_) => Vec::new(),
            Node::Internal(internal) => internal.children(),
        }
    }
}

impl<B: AsRef<[u8]>> TreePage for Node<B> {
    fn bytes(&self) -> &[u8] {
        match self {
            Node::Leaf(leaf) => leaf.bytes(),
            Node::Internal(internal) => internal.bytes(),
        }
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> TreePageMut for Node<B> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Node::Leaf(leaf) => leaf.bytes_mut(),
            Node::Internal(internal) => internal.bytes_mut(),
        }
    }
}

fn kind_mismatch(node: PageId, sibling: PageId) -> StrataError {
    StrataError::BTreeCorrupted(format!(
        "siblings {} and {} are of different page kinds",
        node, sibling
    ))
}

impl<B> Node<B>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    /// Merges every entry into the left sibling `recipient`.
    ///
    /// `middle_key` is the parent's separator between the two pages and is
    /// only used by internal pages. Returns the children that moved.
    pub fn move_all_to<R>(&mut self, recipient: &mut Node<R>, middle_key: &[u8]) -> Result<Vec<PageId>>
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        match (self, recipient) {
            (Node::Leaf(from), Node::Leaf(to)) => {
                from.move_all_to(to);
                Ok(Vec::new())
            }
            (Node::Internal(from), Node::Internal(to)) => Ok(from.move_all_to(to, middle_key)),
            (from, to) => Err(kind_mismatch(from.page_id(), to.page_id())),
        }
    }

    /// Lends the first entry to the left sibling `recipient`.
    pub fn move_first_to_end_of<R>(
        &mut self,
        recipient: &mut Node<R>,
        middle_key: &[u8],
    ) -> Result<Option<PageId>>
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        match (self, recipient) {
            (Node::Leaf(from), Node::Leaf(to)) => {
                from.move_first_to_end_of(to);
                Ok(None)
            }
            (Node::Internal(from), Node::Internal(to)) => {
                Ok(Some(from.move_first_to_end_of(to, middle_key)))
            }
            (from, to) => Err(kind_mismatch(from.page_id(), to.page_id())),
        }
    }

    /// Lends the last entry to the right sibling `recipient`.
    pub fn move_last_to_front_of<R>(
        &mut self,
        recipient: &mut Node<R>,
        middle_key: &[u8],
    ) -> Result<Option<PageId>>
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        match (self, recipient) {
            (Node::Leaf(from), Node::Leaf(to)) => {
                from.move_last_to_front_of(to);
                Ok(None)
            }
            (Node::Internal(from), Node::Internal(to)) => {
                Ok(Some(from.move_last_to_front_of(to, middle_key)))
            }
            (from, to) => Err(kind_mismatch(from.page_id(), to.page_id())),
        }
    }
}
