//! Forward cursor over the leaf chain.

use bytes::Bytes;
use strata_buffer::{BufferPool, PageGuard};
use strata_common::page::PageId;
use strata_common::{Result, StrataError};

use super::leaf::LeafPage;
use super::types::TreePage;
use crate::row_id::RowId;

/// Cursor positioned on one leaf slot.
///
/// The current leaf stays pinned while the cursor is on it. Moving past its
/// last slot releases it and pins the next leaf. The exhausted cursor holds
/// no pin and compares equal to every other exhausted cursor.
pub struct IndexIterator<'a> {
    pool: &'a BufferPool,
    guard: Option<PageGuard<'a>>,
    slot: usize,
    /// Error hit while advancing, reported by the next `next()` call.
    pending: Option<StrataError>,
}

impl<'a> IndexIterator<'a> {
    /// Positions a cursor on `slot` of `leaf`, skipping forward past the end
    /// of the leaf if needed.
    pub(crate) fn new(pool: &'a BufferPool, leaf: PageGuard<'a>, slot: usize) -> Result<Self> {
        let mut iter = Self {
            pool,
            guard: Some(leaf),
            slot,
            pending: None,
        };
        iter.settle()?;
        Ok(iter)
    }

    pub(crate) fn end(pool: &'a BufferPool) -> Self {
        Self {
            pool,
            guard: None,
            slot: 0,
            pending: None,
        }
    }

    /// Follows the leaf chain until the slot is inside a leaf or the chain ends.
    fn settle(&mut self) -> Result<()> {
        loop {
            let Some(guard) = &self.guard else {
                self.slot = 0;
                return Ok(());
            };
            let (size, next) = {
                let data = guard.data();
                let leaf = LeafPage::open(&*data, guard.page_id())?;
                (leaf.size(), leaf.next_page_id())
            };
            if self.slot < size {
                return Ok(());
            }

            self.guard = None;
            self.slot = 0;
            if next.is_valid() {
                self.guard = Some(self.pool.fetch_page(next)?);
            }
        }
    }

    pub fn is_end(&self) -> bool {
        self.guard.is_none()
    }

    /// Leaf the cursor is on, INVALID when exhausted.
    pub fn page_id(&self) -> PageId {
        self.guard
            .as_ref()
            .map(|g| g.page_id())
            .unwrap_or(PageId::INVALID)
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Key and row id under the cursor.
    pub fn item(&self) -> Result<(Bytes, RowId)> {
        let guard = self.guard.as_ref().ok_or(StrataError::CursorExhausted)?;
        let data = guard.data();
        let leaf = LeafPage::new(&*data);
        let (key, row_id) = leaf.item(self.slot);
        Ok((Bytes::copy_from_slice(key), row_id))
    }

    pub fn key(&self) -> Result<Bytes> {
        self.item().map(|(key, _)| key)
    }

    pub fn row_id(&self) -> Result<RowId> {
        let guard = self.guard.as_ref().ok_or(StrataError::CursorExhausted)?;
        let data = guard.data();
        let row_id = LeafPage::new(&*data).value_at(self.slot);
        Ok(row_id)
    }

    /// Moves to the next entry. A no-op on the exhausted cursor.
    pub fn advance(&mut self) -> Result<()> {
        if self.is_end() {
            return Ok(());
        }
        self.slot += 1;
        self.settle()
    }
}

impl PartialEq for IndexIterator<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.page_id() == other.page_id() && self.slot == other.slot
    }
}

impl Iterator for IndexIterator<'_> {
    type Item = Result<(Bytes, RowId)>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.pending.take() {
            return Some(Err(err));
        }
        if self.is_end() {
            return None;
        }
        let item = match self.item() {
            Ok(item) => item,
            Err(e) => {
                self.guard = None;
                return Some(Err(e));
            }
        };
        if let Err(e) = self.advance() {
            self.guard = None;
            self.pending = Some(e);
        }
        Some(Ok(item))
    }
}

impl std::fmt::Debug for IndexIterator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexIterator")
            .field("page_id", &self.page_id())
            .field("slot", &self.slot)
            .finish()
    }
}
