//! Index roots directory.
//!
//! Page layout (on `INDEX_ROOTS_PAGE_ID`):
//! ```text
//! +------------------------------+ 0
//! | magic: u32                   |
//! | count: u32                   |
//! +------------------------------+ 8
//! | index_id: u32 | root: u32    |  count records
//! | ...                          |
//! +------------------------------+ PAGE_SIZE
//! ```

use strata_buffer::BufferPool;
use strata_common::page::{read_u32, write_u32, PageId, INDEX_ROOTS_PAGE_ID, PAGE_SIZE};
use strata_common::{Result, StrataError};
use tracing::debug;

/// Magic number identifying the roots directory ("IDXR").
pub const INDEX_ROOTS_MAGIC: u32 = 0x4944_5852;

const MAGIC_OFFSET: usize = 0;
const COUNT_OFFSET: usize = 4;
const RECORDS_OFFSET: usize = 8;
const RECORD_SIZE: usize = 8;

/// Number of indexes the directory can hold.
pub const MAX_INDEX_ROOTS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

/// View over the roots directory page.
pub struct IndexRootsPage<B> {
    data: B,
}

impl<B: AsRef<[u8]>> IndexRootsPage<B> {
    /// Opens an initialized directory, checking its magic number.
    pub fn open(data: B) -> Result<Self> {
        let magic = read_u32(data.as_ref(), MAGIC_OFFSET);
        if magic != INDEX_ROOTS_MAGIC {
            return Err(StrataError::PageCorrupted {
                page_id: INDEX_ROOTS_PAGE_ID.0,
                reason: format!("bad index roots magic {:#010x}", magic),
            });
        }
        Ok(Self { data })
    }

    pub fn count(&self) -> usize {
        read_u32(self.data.as_ref(), COUNT_OFFSET) as usize
    }

    pub const fn capacity() -> usize {
        MAX_INDEX_ROOTS
    }

    fn record_offset(index: usize) -> usize {
        RECORDS_OFFSET + index * RECORD_SIZE
    }

    fn index_id_at(&self, index: usize) -> u32 {
        read_u32(self.data.as_ref(), Self::record_offset(index))
    }

    fn position(&self, index_id: u32) -> Option<usize> {
        (0..self.count()).find(|&i| self.index_id_at(i) == index_id)
    }

    /// Root page recorded for `index_id`.
    ///
    /// A recorded INVALID root means the index exists but is empty.
    pub fn get_root_id(&self, index_id: u32) -> Option<PageId> {
        self.position(index_id)
            .map(|i| PageId::read_le(self.data.as_ref(), Self::record_offset(i) + 4))
    }

    /// Every (index id, root) record in insertion order.
    pub fn records(&self) -> Vec<(u32, PageId)> {
        (0..self.count())
            .map(|i| {
                let offset = Self::record_offset(i);
                (self.index_id_at(i), PageId::read_le(self.data.as_ref(), offset + 4))
            })
            .collect()
    }
}

impl<B> IndexRootsPage<B>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    /// Formats the buffer as an empty directory.
    pub fn init(mut data: B) -> Self {
        let buf = data.as_mut();
        buf.fill(0);
        write_u32(buf, MAGIC_OFFSET, INDEX_ROOTS_MAGIC);
        write_u32(buf, COUNT_OFFSET, 0);
        Self { data }
    }

    fn set_count(&mut self, count: usize) {
        write_u32(self.data.as_mut(), COUNT_OFFSET, count as u32);
    }

    /// Adds a record. False if `index_id` is already present or the page is full.
    pub fn insert(&mut self, index_id: u32, root: PageId) -> bool {
        let count = self.count();
        if count >= MAX_INDEX_ROOTS || self.position(index_id).is_some() {
            return false;
        }
        let offset = Self::record_offset(count);
        let buf = self.data.as_mut();
        write_u32(buf, offset, index_id);
        write_u32(buf, offset + 4, root.0);
        self.set_count(count + 1);
        true
    }

    /// Changes the root of an existing record. False if `index_id` is absent.
    pub fn update(&mut self, index_id: u32, root: PageId) -> bool {
        let Some(i) = self.position(index_id) else {
            return false;
        };
        write_u32(self.data.as_mut(), Self::record_offset(i) + 4, root.0);
        true
    }

    /// Removes a record. False if `index_id` is absent.
    pub fn delete(&mut self, index_id: u32) -> bool {
        let Some(i) = self.position(index_id) else {
            return false;
        };
        let count = self.count();
        let start = Self::record_offset(i + 1);
        let end = Self::record_offset(count);
        self.data
            .as_mut()
            .copy_within(start..end, Self::record_offset(i));
        self.set_count(count - 1);
        true
    }
}

/// Makes sure the roots directory exists on `INDEX_ROOTS_PAGE_ID`.
///
/// On a fresh store the page is allocated and formatted; it must be the
/// first page the store hands out. Otherwise the existing page's magic
/// number is checked.
pub fn bootstrap_roots_page(pool: &BufferPool) -> Result<()> {
    if pool.is_page_free(INDEX_ROOTS_PAGE_ID)? {
        let mut guard = pool.new_page()?;
        if guard.page_id() != INDEX_ROOTS_PAGE_ID {
            return Err(StrataError::Internal(format!(
                "roots directory must be {}, store allocated {}",
                INDEX_ROOTS_PAGE_ID,
                guard.page_id()
            )));
        }
        IndexRootsPage::init(&mut *guard.data_mut());
        debug!(page_id = INDEX_ROOTS_PAGE_ID.0, "initialized index roots directory");
        return Ok(());
    }

    let guard = pool.fetch_page(INDEX_ROOTS_PAGE_ID)?;
    let data = guard.data();
    IndexRootsPage::open(&*data)?;
    Ok(())
}
