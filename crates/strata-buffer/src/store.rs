//! Block store abstraction consumed by the buffer pool.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use strata_common::page::{PageId, PAGE_SIZE};
use strata_common::{Result, StrataError};

/// Persistent home of fixed-size pages.
///
/// The buffer pool only ever moves whole pages in and out of a block store
/// and asks it for fresh page ids. How the store tracks free space is its
/// own business.
pub trait BlockStore: Send + Sync {
    /// Reads page `page_id` into `buf`. Pages never written read as zeros.
    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()>;

    /// Writes `buf` as the contents of page `page_id`.
    fn write_page(&self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<()>;

    /// Reserves a fresh page id.
    ///
    /// Returns `StrataError::OutOfSpace` when no id can be handed out.
    fn allocate_page(&self) -> Result<PageId>;

    /// Releases a page id. Returns false if the page was already free.
    fn deallocate_page(&self, page_id: PageId) -> Result<bool>;

    /// Returns true if `page_id` is not currently allocated.
    fn is_page_free(&self, page_id: PageId) -> Result<bool>;

    /// Forces buffered writes to stable storage.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory block store.
///
/// Pages live in a Vec indexed by page id. An optional capacity bounds the
/// number of simultaneously allocated pages so exhaustion can be exercised.
pub struct MemoryBlockStore {
    inner: Mutex<MemoryInner>,
    capacity: Option<usize>,
    reads: AtomicU64,
    writes: AtomicU64,
}

struct MemoryInner {
    /// Page contents by page id.
    pages: Vec<Box<[u8; PAGE_SIZE]>>,
    /// Allocation flag by page id.
    allocated: Vec<bool>,
}

impl MemoryBlockStore {
    /// Creates an unbounded store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                pages: Vec::new(),
                allocated: Vec::new(),
            }),
            capacity: None,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Creates a store that holds at most `capacity` allocated pages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    /// Number of page reads served.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of page writes accepted.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Number of currently allocated pages.
    pub fn allocated_count(&self) -> usize {
        self.inner.lock().allocated.iter().filter(|a| **a).count()
    }
}

impl Default for MemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockStore for MemoryBlockStore {
    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.lock();
        match inner.pages.get(page_id.0 as usize) {
            Some(page) => buf.copy_from_slice(&page[..]),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<()> {
        if !page_id.is_valid() {
            return Err(StrataError::PageNotFound {
                page_id: page_id.0,
            });
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock();
        let idx = page_id.0 as usize;
        while inner.pages.len() <= idx {
            inner.pages.push(Box::new([0u8; PAGE_SIZE]));
            inner.allocated.push(false);
        }
        inner.pages[idx].copy_from_slice(buf);
        Ok(())
    }

    fn allocate_page(&self) -> Result<PageId> {
        let mut inner = self.inner.lock();
        let in_use = inner.allocated.iter().filter(|a| **a).count();
        if self.capacity.is_some_and(|cap| in_use >= cap) {
            return Err(StrataError::OutOfSpace);
        }

        let idx = match inner.allocated.iter().position(|a| !*a) {
            Some(idx) => idx,
            None => {
                inner.pages.push(Box::new([0u8; PAGE_SIZE]));
                inner.allocated.push(false);
                inner.allocated.len() - 1
            }
        };
        inner.allocated[idx] = true;
        inner.pages[idx].fill(0);
        Ok(PageId(idx as u32))
    }

    fn deallocate_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.inner.lock();
        match inner.allocated.get_mut(page_id.0 as usize) {
            Some(flag) if *flag => {
                *flag = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn is_page_free(&self, page_id: PageId) -> Result<bool> {
        let inner = self.inner.lock();
        Ok(!inner
            .allocated
            .get(page_id.0 as usize)
            .copied()
            .unwrap_or(false))
    }
}
