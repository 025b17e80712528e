//! Internal page view.
//!
//! Page layout:
//! ```text
//! +------------------------------+ 0
//! | BTreePageHeader (28 bytes)   |
//! +------------------------------+ 28 (INTERNAL_PAGE_HEADER_SIZE)
//! | key[0] (unused) | child[0]   |
//! | key[1]          | child[1]   |
//! | ...                          |
//! +------------------------------+ 28 + size * (key_size + 4)
//! | free space                   |
//! +------------------------------+ PAGE_SIZE
//! ```
//! Child `i` holds keys in `[key[i], key[i + 1])`. The key in slot 0 is
//! never compared.

use std::cmp::Ordering;

use strata_common::page::PageId;
use strata_common::Result;

use super::constants::{CHILD_ID_SIZE, INTERNAL_PAGE_HEADER_SIZE};
use super::key::KeyComparator;
use super::types::{
    check_header, BTreePageHeader, IndexPageType, TreePage, TreePageMut,
};

/// View over an internal page buffer holding (separator key, child id) pairs.
pub struct InternalPage<B> {
    data: B,
}

impl<B> TreePage for InternalPage<B>
where
    B: AsRef<[u8]>,
{
    fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }
}

impl<B> TreePageMut for InternalPage<B>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }
}

impl<B: AsRef<[u8]>> InternalPage<B> {
    /// Wraps a buffer without checking its page type.
    pub fn new(data: B) -> Self {
        Self { data }
    }

    /// Wraps a buffer that must already be an internal page with a sane header.
    pub fn open(data: B, page_id: PageId) -> Result<Self> {
        check_header(data.as_ref(), page_id, Some(IndexPageType::Internal))?;
        Ok(Self { data })
    }

    pub fn into_inner(self) -> B {
        self.data
    }

    #[inline]
    fn entry_size(&self) -> usize {
        self.key_size() + CHILD_ID_SIZE
    }

    #[inline]
    fn entry_offset(&self, index: usize) -> usize {
        INTERNAL_PAGE_HEADER_SIZE + index * self.entry_size()
    }

    pub fn key_at(&self, index: usize) -> &[u8] {
        let offset = self.entry_offset(index);
        &self.bytes()[offset..offset + self.key_size()]
    }

    pub fn value_at(&self, index: usize) -> PageId {
        PageId::read_le(self.bytes(), self.entry_offset(index) + self.key_size())
    }

    /// Slot holding `child`, if any.
    pub fn value_index(&self, child: PageId) -> Option<usize> {
        (0..self.size()).find(|&i| self.value_at(i) == child)
    }

    /// All child ids in slot order.
    pub fn children(&self) -> Vec<PageId> {
        (0..self.size()).map(|i| self.value_at(i)).collect()
    }

    /// Child whose key range contains `key`.
    ///
    /// Binary search over slots `[1, size)` for the last separator <= `key`.
    pub fn lookup(&self, key: &[u8], cmp: &dyn KeyComparator) -> PageId {
        let mut lo = 1;
        let mut hi = self.size();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if cmp.compare(self.key_at(mid), key) == Ordering::Greater {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        self.value_at(lo - 1)
    }

    fn entries(&self, from: usize, to: usize) -> &[u8] {
        &self.bytes()[self.entry_offset(from)..self.entry_offset(to)]
    }
}

impl<B> InternalPage<B>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    /// Formats the buffer as an empty internal page.
    pub fn init(&mut self, page_id: PageId, parent: PageId, key_size: usize, max_size: usize) {
        let header =
            BTreePageHeader::new(IndexPageType::Internal, page_id, parent, key_size, max_size);
        self.write_header(&header);
    }

    pub fn set_key_at(&mut self, index: usize, key: &[u8]) {
        let offset = self.entry_offset(index);
        let key_size = self.key_size();
        self.bytes_mut()[offset..offset + key_size].copy_from_slice(key);
    }

    pub fn set_value_at(&mut self, index: usize, child: PageId) {
        let offset = self.entry_offset(index) + self.key_size();
        self.bytes_mut()[offset..offset + CHILD_ID_SIZE].copy_from_slice(&child.to_le_bytes());
    }

    /// Shifts slots `[index, size)` one slot right and grows the page.
    fn open_slot(&mut self, index: usize) {
        let size = self.size();
        let start = self.entry_offset(index);
        let end = self.entry_offset(size);
        let entry_size = self.entry_size();
        debug_assert!(end + entry_size <= self.bytes().len());
        self.bytes_mut().copy_within(start..end, start + entry_size);
        self.set_size(size + 1);
    }

    /// Fills a fresh root with two children split by `key`.
    pub fn populate_new_root(&mut self, left: PageId, key: &[u8], right: PageId) {
        self.set_value_at(0, left);
        self.set_key_at(1, key);
        self.set_value_at(1, right);
        self.set_size(2);
    }

    /// Inserts `(key, new_child)` right after the slot holding `old_child`.
    ///
    /// Returns the new size, or None if `old_child` is not a child.
    pub fn insert_node_after(
        &mut self,
        old_child: PageId,
        key: &[u8],
        new_child: PageId,
    ) -> Option<usize> {
        let index = self.value_index(old_child)? + 1;
        self.open_slot(index);
        self.set_key_at(index, key);
        self.set_value_at(index, new_child);
        Some(self.size())
    }

    /// Removes the slot at `index`, shifting later slots left.
    pub fn remove(&mut self, index: usize) {
        let size = self.size();
        let start = self.entry_offset(index + 1);
        let end = self.entry_offset(size);
        let dest = self.entry_offset(index);
        self.bytes_mut().copy_within(start..end, dest);
        self.set_size(size - 1);
    }

    /// Empties a root that has a single child and returns that child.
    pub fn remove_and_return_only_child(&mut self) -> PageId {
        let child = self.value_at(0);
        self.set_size(0);
        child
    }

    fn append_entries(&mut self, entries: &[u8]) {
        let count = entries.len() / self.entry_size();
        let size = self.size();
        let offset = self.entry_offset(size);
        self.bytes_mut()[offset..offset + entries.len()].copy_from_slice(entries);
        self.set_size(size + count);
    }

    /// Moves the upper `size / 2` slots to an empty right sibling.
    ///
    /// The key landing in the recipient's slot 0 is the separator to push
    /// up. Returns the moved children, whose parent pointers now belong to
    /// the recipient.
    pub fn move_half_to<R>(&mut self, recipient: &mut InternalPage<R>) -> Vec<PageId>
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        let keep = size - size / 2;
        recipient.append_entries(self.entries(keep, size));
        self.set_size(keep);
        recipient.children()
    }

    /// Moves every slot to the end of the left sibling `recipient`.
    ///
    /// `middle_key` is the parent's separator between the two pages; it
    /// replaces this page's unused slot 0 key.
    pub fn move_all_to<R>(&mut self, recipient: &mut InternalPage<R>, middle_key: &[u8]) -> Vec<PageId>
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        self.set_key_at(0, middle_key);
        let moved = self.children();
        let size = self.size();
        recipient.append_entries(self.entries(0, size));
        self.set_size(0);
        moved
    }

    /// Moves the first child to the end of the left sibling `recipient`.
    ///
    /// The moved child is keyed by `middle_key`. Afterwards this page's
    /// slot 0 key is the new separator.
    pub fn move_first_to_end_of<R>(&mut self, recipient: &mut InternalPage<R>, middle_key: &[u8]) -> PageId
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let child = self.value_at(0);
        let size = recipient.size();
        recipient.open_slot(size);
        recipient.set_key_at(size, middle_key);
        recipient.set_value_at(size, child);
        self.remove(0);
        child
    }

    /// Moves the last child to the front of the right sibling `recipient`.
    ///
    /// The recipient's old first child is keyed by `middle_key`; the moved
    /// key lands in slot 0 and is the new separator.
    pub fn move_last_to_front_of<R>(&mut self, recipient: &mut InternalPage<R>, middle_key: &[u8]) -> PageId
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let last = self.size() - 1;
        let key = self.key_at(last).to_vec();
        let child = self.value_at(last);
        self.set_size(last);

        recipient.open_slot(0);
        recipient.set_key_at(1, middle_key);
        recipient.set_key_at(0, &key);
        recipient.set_value_at(0, child);
        child
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::key::{u64_key, BytewiseComparator};
    use strata_common::page::PAGE_SIZE;

    fn new_internal(page_id: u32, max_size: usize) -> InternalPage<Vec<u8>> {
        let mut page = InternalPage::new(vec![0u8; PAGE_SIZE]);
        page.init(PageId::new(page_id), PageId::INVALID, 8, max_size);
        page
    }

    /// Builds a page with children 100, 101, ... separated by `separators`.
    fn build(page_id: u32, max_size: usize, separators: &[u64]) -> InternalPage<Vec<u8>> {
        let mut page = new_internal(page_id, max_size);
        page.populate_new_root(PageId::new(100), &u64_key(separators[0]), PageId::new(101));
        for (i, &sep) in separators.iter().enumerate().skip(1) {
            page.insert_node_after(
                PageId::new(100 + i as u32),
                &u64_key(sep),
                PageId::new(101 + i as u32),
            )
            .unwrap();
        }
        page
    }

    fn key_u64(page: &InternalPage<Vec<u8>>, index: usize) -> u64 {
        u64::from_be_bytes(page.key_at(index).try_into().unwrap())
    }

    fn child_ids(page: &InternalPage<Vec<u8>>) -> Vec<u32> {
        page.children().iter().map(|p| p.0).collect()
    }

    #[test]
    fn test_populate_new_root() {
        let page = build(1, 4, &[50]);
        assert_eq!(page.size(), 2);
        assert_eq!(page.value_at(0), PageId::new(100));
        assert_eq!(key_u64(&page, 1), 50);
        assert_eq!(page.value_at(1), PageId::new(101));
        assert!(!page.is_leaf());
    }

    #[test]
    fn test_lookup_routes_by_separator() {
        let page = build(1, 8, &[10, 20, 30]);
        let cmp = BytewiseComparator;

        assert_eq!(page.lookup(&u64_key(0), &cmp), PageId::new(100));
        assert_eq!(page.lookup(&u64_key(9), &cmp), PageId::new(100));
        assert_eq!(page.lookup(&u64_key(10), &cmp), PageId::new(101));
        assert_eq!(page.lookup(&u64_key(25), &cmp), PageId::new(102));
        assert_eq!(page.lookup(&u64_key(30), &cmp), PageId::new(103));
        assert_eq!(page.lookup(&u64_key(1000), &cmp), PageId::new(103));
    }

    #[test]
    fn test_insert_node_after_and_value_index() {
        let mut page = build(1, 8, &[10, 30]);
        assert_eq!(
            page.insert_node_after(PageId::new(101), &u64_key(20), PageId::new(200)),
            Some(4)
        );
        assert_eq!(child_ids(&page), vec![100, 101, 200, 102]);
        assert_eq!(key_u64(&page, 2), 20);
        assert_eq!(page.value_index(PageId::new(200)), Some(2));
        assert_eq!(page.value_index(PageId::new(999)), None);
        assert_eq!(page.insert_node_after(PageId::new(999), &u64_key(1), PageId::new(1)), None);
    }

    #[test]
    fn test_remove_and_only_child() {
        let mut page = build(1, 8, &[10, 20]);
        page.remove(1);
        assert_eq!(child_ids(&page), vec![100, 102]);
        assert_eq!(key_u64(&page, 1), 20);

        page.remove(1);
        assert_eq!(page.remove_and_return_only_child(), PageId::new(100));
        assert_eq!(page.size(), 0);
    }

    #[test]
    fn test_move_half_to() {
        let mut left = build(1, 4, &[10, 20, 30]);
        let mut right = new_internal(2, 4);

        let moved = left.move_half_to(&mut right);
        assert_eq!(child_ids(&left), vec![100, 101]);
        assert_eq!(child_ids(&right), vec![102, 103]);
        assert_eq!(moved, vec![PageId::new(102), PageId::new(103)]);
        // Separator to push up sits in the recipient's slot 0.
        assert_eq!(key_u64(&right, 0), 20);
        assert_eq!(key_u64(&right, 1), 30);
    }

    #[test]
    fn test_move_all_to_pulls_down_middle_key() {
        let mut left = build(1, 8, &[10]);
        let mut right = new_internal(2, 8);
        right.populate_new_root(PageId::new(300), &u64_key(60), PageId::new(301));

        let moved = right.move_all_to(&mut left, &u64_key(50));
        assert_eq!(moved, vec![PageId::new(300), PageId::new(301)]);
        assert_eq!(child_ids(&left), vec![100, 101, 300, 301]);
        assert_eq!(key_u64(&left, 2), 50);
        assert_eq!(key_u64(&left, 3), 60);
        assert_eq!(right.size(), 0);
    }

    #[test]
    fn test_move_first_to_end_of() {
        let mut left = build(1, 8, &[10]);
        let mut right = build(2, 8, &[60, 70]);
        // right's children are 100, 101, 102 with separators 60, 70.

        let moved = right.move_first_to_end_of(&mut left, &u64_key(50));
        assert_eq!(moved, PageId::new(100));
        assert_eq!(left.size(), 3);
        assert_eq!(key_u64(&left, 2), 50);
        assert_eq!(left.value_at(2), PageId::new(100));
        assert_eq!(child_ids(&right), vec![101, 102]);
        assert_eq!(key_u64(&right, 0), 60);
    }

    #[test]
    fn test_move_last_to_front_of() {
        let mut left = build(1, 8, &[10, 20]);
        let mut right = build(2, 8, &[60]);

        let moved = left.move_last_to_front_of(&mut right, &u64_key(50));
        assert_eq!(moved, PageId::new(102));
        assert_eq!(child_ids(&left), vec![100, 101]);
        assert_eq!(child_ids(&right), vec![102, 100, 101]);
        assert_eq!(key_u64(&right, 0), 20);
        assert_eq!(key_u64(&right, 1), 50);
        assert_eq!(key_u64(&right, 2), 60);
    }
}
