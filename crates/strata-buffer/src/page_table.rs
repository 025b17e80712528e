//! Page table mapping resident page ids to frames.

use crate::frame::FrameId;
use std::collections::HashMap;
use strata_common::page::PageId;

/// Maps each resident page to the frame caching it.
///
/// A page id appears at most once. The table is owned by the pool state
/// and only touched with the pool latch held.
#[derive(Debug, Default)]
pub struct PageTable {
    entries: HashMap<PageId, FrameId>,
}

impl PageTable {
    /// Creates a page table sized for `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Looks up the frame caching `page_id`.
    #[inline]
    pub fn get(&self, page_id: PageId) -> Option<FrameId> {
        self.entries.get(&page_id).copied()
    }

    /// Returns true if `page_id` is resident.
    #[inline]
    pub fn contains(&self, page_id: PageId) -> bool {
        self.entries.contains_key(&page_id)
    }

    /// Records that `page_id` now lives in `frame_id`, returning any previous frame.
    #[inline]
    pub fn insert(&mut self, page_id: PageId, frame_id: FrameId) -> Option<FrameId> {
        self.entries.insert(page_id, frame_id)
    }

    /// Removes the mapping for `page_id`.
    #[inline]
    pub fn remove(&mut self, page_id: PageId) -> Option<FrameId> {
        self.entries.remove(&page_id)
    }

    /// Number of resident pages.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no page is resident.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of every (page, frame) pair.
    pub fn entries(&self) -> Vec<(PageId, FrameId)> {
        self.entries.iter().map(|(p, f)| (*p, *f)).collect()
    }
}
