//! Leaf page view.
//!
//! Page layout:
//! ```text
//! +------------------------------+ 0
//! | BTreePageHeader (28 bytes)   |
//! | next_page_id: u32            |
//! +------------------------------+ 32 (LEAF_PAGE_HEADER_SIZE)
//! | key[0] | row_id[0]           |
//! | key[1] | row_id[1]           |  entries in ascending key order
//! | ...                          |
//! +------------------------------+ 32 + size * (key_size + 8)
//! | free space                   |
//! +------------------------------+ PAGE_SIZE
//! ```

use std::cmp::Ordering;

use strata_common::page::{read_u32, write_u32, PageId};
use strata_common::Result;

use super::constants::{LEAF_PAGE_HEADER_SIZE, ROW_ID_SIZE};
use super::key::KeyComparator;
use super::types::{
    check_header, BTreePageHeader, IndexPageType, TreePage, TreePageMut,
};
use crate::row_id::RowId;

const NEXT_PAGE_OFFSET: usize = BTreePageHeader::SIZE;

/// View over a leaf page buffer holding (key, row id) pairs.
pub struct LeafPage<B> {
    data: B,
}

impl<B> TreePage for LeafPage<B>
where
    B: AsRef<[u8]>,
{
    fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }
}

impl<B> TreePageMut for LeafPage<B>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }
}

impl<B: AsRef<[u8]>> LeafPage<B> {
    /// Wraps a buffer without checking its page type.
    pub fn new(data: B) -> Self {
        Self { data }
    }

    /// Wraps a buffer that must already be a leaf page with a sane header.
    pub fn open(data: B, page_id: PageId) -> Result<Self> {
        check_header(data.as_ref(), page_id, Some(IndexPageType::Leaf))?;
        Ok(Self { data })
    }

    pub fn into_inner(self) -> B {
        self.data
    }

    #[inline]
    fn entry_size(&self) -> usize {
        self.key_size() + ROW_ID_SIZE
    }

    #[inline]
    fn entry_offset(&self, index: usize) -> usize {
        LEAF_PAGE_HEADER_SIZE + index * self.entry_size()
    }

    /// Next leaf in key order, INVALID for the last leaf.
    pub fn next_page_id(&self) -> PageId {
        PageId::read_le(self.bytes(), NEXT_PAGE_OFFSET)
    }

    pub fn key_at(&self, index: usize) -> &[u8] {
        let offset = self.entry_offset(index);
        &self.bytes()[offset..offset + self.key_size()]
    }

    pub fn value_at(&self, index: usize) -> RowId {
        let offset = self.entry_offset(index) + self.key_size();
        RowId::from_bytes(&self.bytes()[offset..offset + ROW_ID_SIZE])
    }

    pub fn item(&self, index: usize) -> (&[u8], RowId) {
        (self.key_at(index), self.value_at(index))
    }

    /// Index of the first key >= `key`, or `size()` if every key is smaller.
    pub fn key_index(&self, key: &[u8], cmp: &dyn KeyComparator) -> usize {
        let mut lo = 0;
        let mut hi = self.size();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if cmp.compare(self.key_at(mid), key) == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Exact-match lookup.
    pub fn lookup(&self, key: &[u8], cmp: &dyn KeyComparator) -> Option<RowId> {
        let index = self.key_index(key, cmp);
        if index < self.size() && cmp.compare(self.key_at(index), key) == Ordering::Equal {
            Some(self.value_at(index))
        } else {
            None
        }
    }

    /// Raw bytes of entries `[from, to)`.
    fn entries(&self, from: usize, to: usize) -> &[u8] {
        &self.bytes()[self.entry_offset(from)..self.entry_offset(to)]
    }
}

impl<B> LeafPage<B>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    /// Formats the buffer as an empty leaf.
    pub fn init(&mut self, page_id: PageId, parent: PageId, key_size: usize, max_size: usize) {
        let header = BTreePageHeader::new(IndexPageType::Leaf, page_id, parent, key_size, max_size);
        self.write_header(&header);
        self.set_next_page_id(PageId::INVALID);
    }

    pub fn set_next_page_id(&mut self, next: PageId) {
        write_u32(self.bytes_mut(), NEXT_PAGE_OFFSET, next.0);
    }

    fn write_entry(&mut self, index: usize, key: &[u8], value: RowId) {
        let offset = self.entry_offset(index);
        let key_size = self.key_size();
        let buf = self.bytes_mut();
        buf[offset..offset + key_size].copy_from_slice(key);
        buf[offset + key_size..offset + key_size + ROW_ID_SIZE].copy_from_slice(&value.to_bytes());
    }

    /// Inserts `(key, value)` in sorted position and returns the new size.
    ///
    /// The caller guarantees the key is absent and the page has room.
    pub fn insert(&mut self, key: &[u8], value: RowId, cmp: &dyn KeyComparator) -> usize {
        let size = self.size();
        let index = self.key_index(key, cmp);
        let start = self.entry_offset(index);
        let end = self.entry_offset(size);
        let entry_size = self.entry_size();
        debug_assert!(end + entry_size <= self.bytes().len());

        self.bytes_mut().copy_within(start..end, start + entry_size);
        self.write_entry(index, key, value);
        self.set_size(size + 1);
        size + 1
    }

    /// Removes the entry at `index`, shifting later entries left.
    fn remove_at(&mut self, index: usize) {
        let size = self.size();
        let start = self.entry_offset(index + 1);
        let end = self.entry_offset(size);
        let dest = self.entry_offset(index);
        self.bytes_mut().copy_within(start..end, dest);
        self.set_size(size - 1);
    }

    /// Removes `key` if present. Returns true if an entry was removed.
    pub fn remove(&mut self, key: &[u8], cmp: &dyn KeyComparator) -> bool {
        let index = self.key_index(key, cmp);
        if index >= self.size() || cmp.compare(self.key_at(index), key) != Ordering::Equal {
            return false;
        }
        self.remove_at(index);
        true
    }

    /// Appends raw entries after the current last entry.
    fn append_entries(&mut self, entries: &[u8]) {
        let count = entries.len() / self.entry_size();
        let size = self.size();
        let offset = self.entry_offset(size);
        self.bytes_mut()[offset..offset + entries.len()].copy_from_slice(entries);
        self.set_size(size + count);
    }

    /// Moves the upper `size / 2` entries to an empty right sibling.
    pub fn move_half_to<R>(&mut self, recipient: &mut LeafPage<R>)
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        let keep = size - size / 2;
        recipient.append_entries(self.entries(keep, size));
        self.set_size(keep);
    }

    /// Moves every entry to the end of the left sibling `recipient`.
    ///
    /// The recipient takes over this page's next pointer.
    pub fn move_all_to<R>(&mut self, recipient: &mut LeafPage<R>)
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        recipient.append_entries(self.entries(0, size));
        recipient.set_next_page_id(self.next_page_id());
        self.set_size(0);
    }

    /// Moves the first entry to the end of the left sibling `recipient`.
    pub fn move_first_to_end_of<R>(&mut self, recipient: &mut LeafPage<R>)
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        recipient.append_entries(self.entries(0, 1));
        self.remove_at(0);
    }

    /// Moves the last entry to the front of the right sibling `recipient`.
    pub fn move_last_to_front_of<R>(&mut self, recipient: &mut LeafPage<R>)
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        let (key, value) = self.item(size - 1);
        let key = key.to_vec();
        self.set_size(size - 1);

        let recipient_size = recipient.size();
        let entry_size = recipient.entry_size();
        let end = recipient.entry_offset(recipient_size);
        let start = recipient.entry_offset(0);
        recipient.bytes_mut().copy_within(start..end, start + entry_size);
        recipient.write_entry(0, &key, value);
        recipient.set_size(recipient_size + 1);
    }
}
