//! Page replacement policies for the buffer pool.

use crate::frame::FrameId;
use lru::LruCache;
use parking_lot::Mutex;

/// Trait for page replacement algorithms.
///
/// A replacer tracks the set of frames that may be evicted (those whose
/// pin count dropped to zero) and picks a victim among them.
pub trait Replacer: Send + Sync {
    /// Marks a frame as an eviction candidate. No-op if already tracked.
    fn unpin(&self, frame_id: FrameId);

    /// Removes a frame from the candidate set. No-op if not tracked.
    fn pin(&self, frame_id: FrameId);

    /// Removes and returns the next frame to evict.
    ///
    /// Returns None if no frames are evictable.
    fn victim(&self) -> Option<FrameId>;

    /// Returns the number of evictable frames.
    fn size(&self) -> usize;
}

/// Least-recently-unpinned replacement.
///
/// Candidates are ordered by the time they became evictable. Unpinning a
/// frame that is already a candidate does not refresh its position, so the
/// victim order is strict first-unpinned-first-out. Every operation is O(1).
pub struct LruReplacer {
    /// Internal state protected by mutex.
    inner: Mutex<LruReplacerInner>,
}

struct LruReplacerInner {
    /// Total number of frames tracked.
    num_frames: usize,
    /// Candidates, most recently unpinned at the front.
    candidates: LruCache<FrameId, ()>,
}

impl LruReplacer {
    /// Creates a new LRU replacer for `num_frames` frames.
    pub fn new(num_frames: usize) -> Self {
        Self {
            inner: Mutex::new(LruReplacerInner {
                num_frames,
                candidates: LruCache::unbounded(),
            }),
        }
    }

    /// Returns the total capacity.
    pub fn capacity(&self) -> usize {
        self.inner.lock().num_frames
    }
}

impl Replacer for LruReplacer {
    fn unpin(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        if frame_id.index() >= inner.num_frames {
            return;
        }
        if !inner.candidates.contains(&frame_id) {
            inner.candidates.put(frame_id, ());
        }
    }

    fn pin(&self, frame_id: FrameId) {
        self.inner.lock().candidates.pop(&frame_id);
    }

    fn victim(&self) -> Option<FrameId> {
        self.inner
            .lock()
            .candidates
            .pop_lru()
            .map(|(frame_id, _)| frame_id)
    }

    fn size(&self) -> usize {
        self.inner.lock().candidates.len()
    }
}
