//! Buffer pool manager.

use crate::frame::{BufferFrame, FrameId};
use crate::page_table::PageTable;
use crate::replacer::{LruReplacer, Replacer};
use crate::store::BlockStore;
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, Mutex, RwLockReadGuard, RwLockWriteGuard,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use strata_common::page::PageId;
use strata_common::{Result, StrataError};
use tracing::{debug, warn};

/// Configuration for the buffer pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub num_frames: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self { num_frames: 1024 }
    }
}

impl BufferPoolConfig {
    /// Checks that the pool has at least one frame.
    pub fn validate(&self) -> Result<()> {
        if self.num_frames == 0 {
            return Err(StrataError::InvalidParameter {
                name: "num_frames".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

/// Mutable bookkeeping guarded by the pool latch.
struct PoolState {
    /// Page ID to frame ID mapping.
    page_table: PageTable,
    /// Frames holding no page, handed out before any eviction.
    free_list: VecDeque<FrameId>,
}

/// Buffer pool manager.
///
/// Manages a fixed-size pool of page frames with:
/// - Page ID to frame ID mapping
/// - Free frame list for pages not yet cached
/// - Pluggable replacement (least recently unpinned by default)
/// - Pin counting so a page in use is never evicted
///
/// Pages are handed out as [`PageGuard`] leases that unpin on drop. All
/// misses read through, and dirty victims are written back, via the
/// [`BlockStore`].
pub struct BufferPool {
    /// Configuration.
    config: BufferPoolConfig,
    /// Array of buffer frames, owned for the lifetime of the pool.
    frames: Vec<BufferFrame>,
    /// Page table and free list.
    state: Mutex<PoolState>,
    /// Page replacement policy.
    replacer: Box<dyn Replacer>,
    /// Backing block store.
    store: Arc<dyn BlockStore>,
}

impl BufferPool {
    /// Creates a new buffer pool with LRU replacement.
    pub fn new(config: BufferPoolConfig, store: Arc<dyn BlockStore>) -> Self {
        let replacer = Box::new(LruReplacer::new(config.num_frames));
        Self::with_replacer(config, store, replacer)
    }

    /// Creates a new buffer pool with a caller-supplied replacement policy.
    pub fn with_replacer(
        config: BufferPoolConfig,
        store: Arc<dyn BlockStore>,
        replacer: Box<dyn Replacer>,
    ) -> Self {
        let num_frames = config.num_frames;

        let frames: Vec<_> = (0..num_frames)
            .map(|i| BufferFrame::new(FrameId(i as u32)))
            .collect();

        // All frames start in free list
        let free_list: VecDeque<_> = (0..num_frames).map(|i| FrameId(i as u32)).collect();

        Self {
            config,
            frames,
            state: Mutex::new(PoolState {
                page_table: PageTable::new(num_frames),
                free_list,
            }),
            replacer,
            store,
        }
    }

    /// Returns the number of frames in the pool.
    pub fn num_frames(&self) -> usize {
        self.config.num_frames
    }

    /// Returns the number of free frames.
    pub fn free_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Returns the number of pages currently in the pool.
    pub fn page_count(&self) -> usize {
        self.state.lock().page_table.len()
    }

    /// Checks if a page is in the buffer pool.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.state.lock().page_table.contains(page_id)
    }

    /// Returns the pin count of a resident page.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        let frame_id = state.page_table.get(page_id)?;
        Some(self.frames[frame_id.index()].pin_count())
    }

    /// Returns the dirty flag of a resident page.
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        let state = self.state.lock();
        let frame_id = state.page_table.get(page_id)?;
        Some(self.frames[frame_id.index()].is_dirty())
    }

    /// Returns the backing block store.
    pub fn store(&self) -> &Arc<dyn BlockStore> {
        &self.store
    }

    /// Obtains a frame for a page that is not resident.
    ///
    /// Tries the free list first, then asks the replacer for a victim. A
    /// dirty victim is written back and its page table entry removed.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let victim_id = self.replacer.victim().ok_or(StrataError::BufferPoolFull)?;
        let frame = &self.frames[victim_id.index()];

        if let Some(old_page_id) = frame.page_id() {
            if frame.is_dirty() {
                let data = frame.read_data();
                if let Err(e) = self.store.write_page(old_page_id, &data) {
                    drop(data);
                    self.replacer.unpin(victim_id);
                    return Err(e);
                }
                frame.set_dirty(false);
                debug!(
                    page_id = old_page_id.0,
                    frame = victim_id.0,
                    "wrote back dirty victim"
                );
            }
            state.page_table.remove(old_page_id);
            debug!(page_id = old_page_id.0, frame = victim_id.0, "evicted page");
        }

        Ok(victim_id)
    }

    /// Fetches a page, reading it from the block store on a miss.
    ///
    /// The page is pinned until the returned guard is dropped. Fails with
    /// `BufferPoolFull` when every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PageGuard<'_>> {
        if !page_id.is_valid() {
            return Err(StrataError::PageNotFound { page_id: page_id.0 });
        }

        let mut state = self.state.lock();

        if let Some(frame_id) = state.page_table.get(page_id) {
            let frame = &self.frames[frame_id.index()];
            frame.pin();
            self.replacer.pin(frame_id);
            return Ok(PageGuard::new(self, frame, page_id));
        }

        let frame_id = self.acquire_frame(&mut state)?;
        let frame = &self.frames[frame_id.index()];

        {
            let mut data = frame.write_data();
            if let Err(e) = self.store.read_page(page_id, &mut data) {
                drop(data);
                frame.reset();
                state.free_list.push_back(frame_id);
                return Err(e);
            }
        }

        frame.install(page_id);
        state.page_table.insert(page_id, frame_id);

        Ok(PageGuard::new(self, frame, page_id))
    }

    /// Allocates a fresh page in the block store and caches it zeroed.
    ///
    /// The new page id is available from the returned guard. Fails with
    /// `BufferPoolFull` when no frame can be obtained (no page id is
    /// consumed in that case) or with the store's error when it is out of
    /// space.
    pub fn new_page(&self) -> Result<PageGuard<'_>> {
        let mut state = self.state.lock();

        if state.free_list.is_empty() && self.replacer.size() == 0 {
            return Err(StrataError::BufferPoolFull);
        }

        let page_id = self.store.allocate_page()?;

        let frame_id = match self.acquire_frame(&mut state) {
            Ok(frame_id) => frame_id,
            Err(e) => {
                self.store.deallocate_page(page_id)?;
                return Err(e);
            }
        };

        let frame = &self.frames[frame_id.index()];
        frame.write_data().fill(0);
        frame.install(page_id);
        state.page_table.insert(page_id, frame_id);

        debug!(page_id = page_id.0, frame = frame_id.0, "allocated new page");
        Ok(PageGuard::new(self, frame, page_id))
    }

    /// Releases one pin on a page, ORing in `is_dirty`.
    ///
    /// When the pin count reaches zero the frame becomes an eviction
    /// candidate. Returns false if the page is not resident or was not
    /// pinned; the pin count never goes below zero.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock();

        let Some(frame_id) = state.page_table.get(page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.index()];

        match frame.unpin() {
            None => {
                warn!(page_id = page_id.0, "unpin of a page that is not pinned");
                false
            }
            Some(remaining) => {
                if is_dirty {
                    frame.set_dirty(true);
                }
                if remaining == 0 {
                    self.replacer.unpin(frame_id);
                }
                true
            }
        }
    }

    /// Writes a resident page back to the block store if it is dirty.
    ///
    /// Returns false if the page is not resident. Must not be called while
    /// the same thread holds a `data_mut` view of the page.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let state = self.state.lock();

        let Some(frame_id) = state.page_table.get(page_id) else {
            return Ok(false);
        };
        self.flush_frame(&self.frames[frame_id.index()], page_id)?;
        Ok(true)
    }

    fn flush_frame(&self, frame: &BufferFrame, page_id: PageId) -> Result<bool> {
        if !frame.is_dirty() {
            return Ok(false);
        }
        let data = frame.read_data();
        self.store.write_page(page_id, &data)?;
        frame.set_dirty(false);
        Ok(true)
    }

    /// Flushes all dirty pages.
    ///
    /// Returns the number of pages written.
    pub fn flush_all(&self) -> Result<usize> {
        let state = self.state.lock();

        let mut flushed = 0;
        for (page_id, frame_id) in state.page_table.entries() {
            if self.flush_frame(&self.frames[frame_id.index()], page_id)? {
                flushed += 1;
            }
        }
        Ok(flushed)
    }

    /// Deletes a page, releasing its id in the block store.
    ///
    /// A page that is not resident is still released and reported as
    /// deleted. Returns false if the page is pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.state.lock();

        let Some(frame_id) = state.page_table.get(page_id) else {
            self.store.deallocate_page(page_id)?;
            return Ok(true);
        };

        let frame = &self.frames[frame_id.index()];
        if frame.is_pinned() {
            debug!(
                page_id = page_id.0,
                pin_count = frame.pin_count(),
                "refusing to delete pinned page"
            );
            return Ok(false);
        }

        self.store.deallocate_page(page_id)?;
        self.replacer.pin(frame_id);
        state.page_table.remove(page_id);
        frame.reset();
        state.free_list.push_back(frame_id);

        Ok(true)
    }

    /// Returns true if the block store considers `page_id` unallocated.
    pub fn is_page_free(&self, page_id: PageId) -> Result<bool> {
        self.store.is_page_free(page_id)
    }

    /// Returns true if no resident page is pinned, logging any that are.
    pub fn check_all_unpinned(&self) -> bool {
        let state = self.state.lock();

        let mut all_unpinned = true;
        for (page_id, frame_id) in state.page_table.entries() {
            let frame = &self.frames[frame_id.index()];
            if frame.is_pinned() {
                warn!(
                    page_id = page_id.0,
                    pin_count = frame.pin_count(),
                    "page still pinned"
                );
                all_unpinned = false;
            }
        }
        all_unpinned
    }

    /// Returns statistics about the buffer pool.
    pub fn stats(&self) -> BufferPoolStats {
        let state = self.state.lock();

        let mut pinned_count = 0;
        let mut dirty_count = 0;
        for (_, frame_id) in state.page_table.entries() {
            let frame = &self.frames[frame_id.index()];
            if frame.is_pinned() {
                pinned_count += 1;
            }
            if frame.is_dirty() {
                dirty_count += 1;
            }
        }

        BufferPoolStats {
            total_frames: self.config.num_frames,
            free_frames: state.free_list.len(),
            used_frames: state.page_table.len(),
            evictable_frames: self.replacer.size(),
            pinned_frames: pinned_count,
            dirty_frames: dirty_count,
        }
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        match self.flush_all() {
            Ok(flushed) => debug!(flushed, "buffer pool flushed on drop"),
            Err(e) => warn!(error = %e, "failed to flush buffer pool on drop"),
        }
    }
}

/// Statistics about the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolStats {
    /// Total number of frames.
    pub total_frames: usize,
    /// Number of free frames.
    pub free_frames: usize,
    /// Number of frames with pages.
    pub used_frames: usize,
    /// Number of frames the replacer may evict.
    pub evictable_frames: usize,
    /// Number of pinned frames.
    pub pinned_frames: usize,
    /// Number of dirty frames.
    pub dirty_frames: usize,
}

/// Lease on a pinned page.
///
/// The page cannot be evicted while the guard lives. Dropping the guard
/// unpins the page, passing along whether it was written through
/// [`PageGuard::data_mut`] or [`PageGuard::mark_dirty`].
pub struct PageGuard<'a> {
    pool: &'a BufferPool,
    frame: &'a BufferFrame,
    page_id: PageId,
    dirty: bool,
}

impl<'a> PageGuard<'a> {
    fn new(pool: &'a BufferPool, frame: &'a BufferFrame, page_id: PageId) -> Self {
        Self {
            pool,
            frame,
            page_id,
            dirty: false,
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page bytes.
    pub fn data(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        RwLockReadGuard::map(self.frame.read_data(), |d| &d[..])
    }

    /// Returns the page bytes for writing and marks the page dirty.
    pub fn data_mut(&mut self) -> MappedRwLockWriteGuard<'_, [u8]> {
        self.dirty = true;
        RwLockWriteGuard::map(self.frame.write_data(), |d| &mut d[..])
    }

    /// Marks the page dirty without touching its bytes.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Returns true if this lease will unpin the page as dirty.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns the frame's current pin count.
    pub fn pin_count(&self) -> u32 {
        self.frame.pin_count()
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, self.dirty);
    }
}

impl std::fmt::Debug for PageGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageGuard")
            .field("page_id", &self.page_id)
            .field("frame_id", &self.frame.frame_id())
            .field("dirty", &self.dirty)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBlockStore;
    use strata_common::page::PAGE_SIZE;

    fn create_test_pool(num_frames: usize) -> (Arc<MemoryBlockStore>, BufferPool) {
        let store = Arc::new(MemoryBlockStore::new());
        let pool = BufferPool::new(BufferPoolConfig { num_frames }, store.clone());
        (store, pool)
    }

    fn marker(page_id: PageId) -> u8 {
        0xA0 + page_id.0 as u8
    }

    /// Creates `n` dirty, unpinned pages stamped with `marker` in byte 0.
    fn create_pages(pool: &BufferPool, n: usize) -> Vec<PageId> {
        (0..n)
            .map(|_| {
                let mut guard = pool.new_page().unwrap();
                let id = guard.page_id();
                guard.data_mut()[0] = marker(id);
                id
            })
            .collect()
    }

    #[test]
    fn test_buffer_pool_config_default() {
        let config = BufferPoolConfig::default();
        assert_eq!(config.num_frames, 1024);
        assert!(config.validate().is_ok());
        assert!(BufferPoolConfig { num_frames: 0 }.validate().is_err());
    }

    #[test]
    fn test_buffer_pool_config_serde_roundtrip() {
        let original = BufferPoolConfig { num_frames: 16 };
        let json = serde_json::to_string(&original).unwrap();
        let back: BufferPoolConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.num_frames, 16);
    }

    #[test]
    fn test_buffer_pool_new() {
        let (_, pool) = create_test_pool(10);
        assert_eq!(pool.num_frames(), 10);
        assert_eq!(pool.free_count(), 10);
        assert_eq!(pool.page_count(), 0);
    }

    #[test]
    fn test_new_page_pins_and_zeroes() {
        let (_, pool) = create_test_pool(4);

        let guard = pool.new_page().unwrap();
        assert_eq!(guard.page_id(), PageId::new(0));
        assert_eq!(guard.pin_count(), 1);
        assert!(guard.data().iter().all(|b| *b == 0));
        assert!(pool.contains(PageId::new(0)));
        assert_eq!(pool.is_dirty(PageId::new(0)), Some(false));
        assert_eq!(pool.free_count(), 3);
    }

    #[test]
    fn test_guard_drop_unpins() {
        let (_, pool) = create_test_pool(4);

        let page_id = {
            let guard = pool.new_page().unwrap();
            guard.page_id()
        };
        assert_eq!(pool.pin_count(page_id), Some(0));
        assert_eq!(pool.is_dirty(page_id), Some(false));
    }

    #[test]
    fn test_guard_data_mut_marks_dirty() {
        let (_, pool) = create_test_pool(4);

        let page_id = {
            let mut guard = pool.new_page().unwrap();
            guard.data_mut()[10] = 0x42;
            assert!(guard.is_dirty());
            guard.page_id()
        };
        assert_eq!(pool.is_dirty(page_id), Some(true));

        let guard = pool.fetch_page(page_id).unwrap();
        assert_eq!(guard.data()[10], 0x42);
    }

    #[test]
    fn test_fetch_resident_increments_pin() {
        let (_, pool) = create_test_pool(4);

        let first = pool.new_page().unwrap();
        let page_id = first.page_id();
        let second = pool.fetch_page(page_id).unwrap();
        assert_eq!(second.pin_count(), 2);

        drop(first);
        assert_eq!(pool.pin_count(page_id), Some(1));
        drop(second);
        assert_eq!(pool.pin_count(page_id), Some(0));
    }

    #[test]
    fn test_fetch_invalid_page() {
        let (_, pool) = create_test_pool(4);
        assert!(matches!(
            pool.fetch_page(PageId::INVALID),
            Err(StrataError::PageNotFound { .. })
        ));
    }

    #[test]
    fn test_pool_full_when_all_pinned() {
        let (store, pool) = create_test_pool(2);

        let _a = pool.new_page().unwrap();
        let _b = pool.new_page().unwrap();

        assert!(matches!(pool.new_page(), Err(StrataError::BufferPoolFull)));
        assert!(matches!(
            pool.fetch_page(PageId::new(7)),
            Err(StrataError::BufferPoolFull)
        ));
        // The failed new_page did not consume a page id.
        assert_eq!(store.allocated_count(), 2);
    }

    #[test]
    fn test_evicts_least_recently_unpinned() {
        let (_, pool) = create_test_pool(2);
        let ids = create_pages(&pool, 2);
        let (a, b) = (ids[0], ids[1]);

        // Fetch(A), Unpin(A), Fetch(B), Unpin(B)
        drop(pool.fetch_page(a).unwrap());
        drop(pool.fetch_page(b).unwrap());

        let _c = pool.new_page().unwrap();
        assert!(!pool.contains(a));
        assert!(pool.contains(b));
    }

    #[test]
    fn test_eviction_order_follows_unpin_order() {
        let (_, pool) = create_test_pool(3);
        let ids = create_pages(&pool, 3);

        let guards: Vec<_> = ids.iter().map(|id| pool.fetch_page(*id).unwrap()).collect();
        // Unpin in order B, A, C.
        let mut guards: Vec<Option<PageGuard<'_>>> = guards.into_iter().map(Some).collect();
        guards[1].take();
        guards[0].take();
        guards[2].take();

        let _n1 = pool.new_page().unwrap();
        assert!(!pool.contains(ids[1]));
        assert!(pool.contains(ids[0]));
        let _n2 = pool.new_page().unwrap();
        assert!(!pool.contains(ids[0]));
        assert!(pool.contains(ids[2]));
        let _n3 = pool.new_page().unwrap();
        assert!(!pool.contains(ids[2]));
    }

    #[test]
    fn test_dirty_victim_written_back() {
        let (store, pool) = create_test_pool(1);
        let ids = create_pages(&pool, 1);
        let writes_before = store.writes();

        // Evicts ids[0], which is dirty.
        let other = pool.new_page().unwrap().page_id();
        assert!(!pool.contains(ids[0]));
        assert_eq!(store.writes(), writes_before + 1);

        let guard = pool.fetch_page(ids[0]).unwrap();
        assert_eq!(guard.data()[0], marker(ids[0]));
        assert!(!pool.contains(other));
    }

    #[test]
    fn test_pinned_page_never_evicted() {
        let (_, pool) = create_test_pool(3);

        let mut held = pool.new_page().unwrap();
        held.data_mut()[0] = 0x77;
        let held_id = held.page_id();

        for _ in 0..20 {
            let mut g = pool.new_page().unwrap();
            g.data_mut()[0] = 0x11;
        }

        assert!(pool.contains(held_id));
        assert_eq!(held.data()[0], 0x77);
    }

    #[test]
    fn test_unpin_page_not_resident() {
        let (_, pool) = create_test_pool(2);
        assert!(!pool.unpin_page(PageId::new(5), false));
    }

    #[test]
    fn test_unpin_page_at_zero_is_rejected() {
        let (_, pool) = create_test_pool(2);
        let ids = create_pages(&pool, 1);

        assert_eq!(pool.pin_count(ids[0]), Some(0));
        assert!(!pool.unpin_page(ids[0], true));
        assert_eq!(pool.pin_count(ids[0]), Some(0));
    }

    #[test]
    fn test_manual_unpin_ors_dirty() {
        let (_, pool) = create_test_pool(2);
        let guard = pool.new_page().unwrap();
        let page_id = guard.page_id();
        let extra = pool.fetch_page(page_id).unwrap();

        assert!(pool.unpin_page(page_id, true));
        // Clean unpin does not clear the flag.
        drop(extra);
        std::mem::forget(guard);
        assert_eq!(pool.is_dirty(page_id), Some(true));
        assert_eq!(pool.pin_count(page_id), Some(0));
    }

    #[test]
    fn test_flush_page() {
        let (store, pool) = create_test_pool(2);
        let ids = create_pages(&pool, 1);

        assert!(!pool.flush_page(PageId::new(9)).unwrap());

        let writes = store.writes();
        assert!(pool.flush_page(ids[0]).unwrap());
        assert_eq!(store.writes(), writes + 1);
        assert_eq!(pool.is_dirty(ids[0]), Some(false));

        // Clean page: still true, no write.
        assert!(pool.flush_page(ids[0]).unwrap());
        assert_eq!(store.writes(), writes + 1);
    }

    #[test]
    fn test_flush_all() {
        let (store, pool) = create_test_pool(4);
        create_pages(&pool, 3);

        assert_eq!(pool.flush_all().unwrap(), 3);
        assert_eq!(pool.flush_all().unwrap(), 0);
        assert_eq!(store.writes(), 3);
    }

    #[test]
    fn test_delete_page() {
        let (store, pool) = create_test_pool(2);
        let guard = pool.new_page().unwrap();
        let page_id = guard.page_id();

        // Pinned: refused.
        assert!(!pool.delete_page(page_id).unwrap());
        drop(guard);

        assert!(pool.delete_page(page_id).unwrap());
        assert!(!pool.contains(page_id));
        assert_eq!(pool.free_count(), 2);
        assert!(store.is_page_free(page_id).unwrap());
        assert!(pool.is_page_free(page_id).unwrap());
        assert_eq!(pool.stats().evictable_frames, 0);
    }

    #[test]
    fn test_delete_non_resident_page() {
        let (store, pool) = create_test_pool(1);
        let ids = create_pages(&pool, 2);
        assert!(!pool.contains(ids[0]));

        assert!(pool.delete_page(ids[0]).unwrap());
        assert!(store.is_page_free(ids[0]).unwrap());
    }

    #[test]
    fn test_drop_flushes_dirty_pages() {
        let store = Arc::new(MemoryBlockStore::new());
        let page_id = {
            let pool = BufferPool::new(BufferPoolConfig { num_frames: 4 }, store.clone());
            let mut guard = pool.new_page().unwrap();
            guard.data_mut()[100] = 0x5A;
            guard.page_id()
        };

        let mut buf = [0u8; strata_common::PAGE_SIZE];
        store.read_page(page_id, &mut buf).unwrap();
        assert_eq!(buf[100], 0x5A);
    }

    #[test]
    fn test_check_all_unpinned() {
        let (_, pool) = create_test_pool(4);
        let guard = pool.new_page().unwrap();
        assert!(!pool.check_all_unpinned());
        drop(guard);
        assert!(pool.check_all_unpinned());
    }

    #[test]
    fn test_stats() {
        let (_, pool) = create_test_pool(4);
        create_pages(&pool, 2);
        let _pinned = pool.fetch_page(PageId::new(0)).unwrap();

        let stats = pool.stats();
        assert_eq!(stats.total_frames, 4);
        assert_eq!(stats.free_frames, 2);
        assert_eq!(stats.used_frames, 2);
        assert_eq!(stats.pinned_frames, 1);
        assert_eq!(stats.evictable_frames, 1);
        assert_eq!(stats.dirty_frames, 2);
    }

    #[test]
    fn test_store_exhaustion_surfaces() {
        let store = Arc::new(MemoryBlockStore::with_capacity(1));
        let pool = BufferPool::new(BufferPoolConfig { num_frames: 4 }, store.clone());

        let _a = pool.new_page().unwrap();
        assert!(matches!(pool.new_page(), Err(StrataError::OutOfSpace)));
        assert_eq!(pool.free_count(), 3);
    }

    /// Memory store whose reads and writes can be switched to fail.
    #[derive(Default)]
    struct FailingStore {
        inner: MemoryBlockStore,
        fail_reads: std::sync::atomic::AtomicBool,
        fail_writes: std::sync::atomic::AtomicBool,
    }

    impl FailingStore {
        fn set_fail_reads(&self, fail: bool) {
            self.fail_reads.store(fail, std::sync::atomic::Ordering::SeqCst);
        }

        fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, std::sync::atomic::Ordering::SeqCst);
        }

        fn injected(what: &str) -> StrataError {
            StrataError::Io(std::io::Error::new(std::io::ErrorKind::Other, what.to_string()))
        }
    }

    impl BlockStore for FailingStore {
        fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
            if self.fail_reads.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(Self::injected("read failed"));
            }
            self.inner.read_page(page_id, buf)
        }

        fn write_page(&self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<()> {
            if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(Self::injected("write failed"));
            }
            self.inner.write_page(page_id, buf)
        }

        fn allocate_page(&self) -> Result<PageId> {
            self.inner.allocate_page()
        }

        fn deallocate_page(&self, page_id: PageId) -> Result<bool> {
            self.inner.deallocate_page(page_id)
        }

        fn is_page_free(&self, page_id: PageId) -> Result<bool> {
            self.inner.is_page_free(page_id)
        }
    }

    fn create_failing_pool(num_frames: usize) -> (Arc<FailingStore>, BufferPool) {
        let store = Arc::new(FailingStore::default());
        let pool = BufferPool::new(BufferPoolConfig { num_frames }, store.clone());
        (store, pool)
    }

    #[test]
    fn test_failed_read_returns_frame_to_free_list() {
        let (store, pool) = create_failing_pool(1);
        let a = pool.new_page().unwrap().page_id();
        let b = store.allocate_page().unwrap();

        store.set_fail_reads(true);
        assert!(matches!(pool.fetch_page(b), Err(StrataError::Io(_))));

        // The clean victim was dropped and its frame recycled, not leaked.
        assert!(!pool.contains(a));
        assert!(!pool.contains(b));
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.stats().evictable_frames, 0);

        store.set_fail_reads(false);
        let guard = pool.fetch_page(b).unwrap();
        assert_eq!(guard.page_id(), b);
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn test_failed_write_back_keeps_dirty_victim() {
        let (store, pool) = create_failing_pool(1);
        let ids = create_pages(&pool, 1);
        let other = store.allocate_page().unwrap();

        store.set_fail_writes(true);
        assert!(matches!(pool.fetch_page(other), Err(StrataError::Io(_))));

        // The victim stays resident, dirty and evictable.
        assert!(pool.contains(ids[0]));
        assert_eq!(pool.is_dirty(ids[0]), Some(true));
        assert_eq!(pool.pin_count(ids[0]), Some(0));
        assert_eq!(pool.stats().evictable_frames, 1);
        assert!(!pool.contains(other));

        store.set_fail_writes(false);
        drop(pool.fetch_page(other).unwrap());
        assert!(!pool.contains(ids[0]));

        let guard = pool.fetch_page(ids[0]).unwrap();
        assert_eq!(guard.data()[0], marker(ids[0]));
    }

    #[test]
    fn test_failed_write_back_releases_new_page_id() {
        let (store, pool) = create_failing_pool(1);
        let ids = create_pages(&pool, 1);

        store.set_fail_writes(true);
        assert!(matches!(pool.new_page(), Err(StrataError::Io(_))));
        assert_eq!(store.inner.allocated_count(), 1);
        assert!(pool.contains(ids[0]));
        assert!(pool.check_all_unpinned());
    }
}
