//! Bitmap pages tracking allocation within an extent of data pages.
//!
//! Page layout:
//! ```text
//! +------------------------+ 0
//! | allocated_count: u32   |
//! | next_free_page: u32    |
//! +------------------------+ 8 (BITS_OFFSET)
//! | bitmap bytes           |
//! | bit i = byte[i/8] &    |
//! |   (0x80 >> (i % 8))    |
//! +------------------------+ PAGE_SIZE
//! ```

use strata_common::page::{read_u32, write_u32, PAGE_SIZE};

const ALLOCATED_OFFSET: usize = 0;
const NEXT_FREE_OFFSET: usize = 4;
const BITS_OFFSET: usize = 8;

/// Number of data pages a single bitmap page can track.
pub const BITMAP_CAPACITY: u32 = ((PAGE_SIZE - BITS_OFFSET) * 8) as u32;

/// View over a bitmap page buffer.
///
/// A zeroed buffer is a valid empty bitmap.
pub struct BitmapPage<B> {
    data: B,
}

impl<B: AsRef<[u8]>> BitmapPage<B> {
    /// Wraps a page buffer.
    pub fn new(data: B) -> Self {
        Self { data }
    }

    /// Number of data pages this bitmap can track.
    pub const fn max_supported_size() -> u32 {
        BITMAP_CAPACITY
    }

    /// Number of pages currently allocated.
    pub fn allocated_count(&self) -> u32 {
        read_u32(self.data.as_ref(), ALLOCATED_OFFSET)
    }

    /// Offset the next allocation will hand out.
    pub fn next_free_page(&self) -> u32 {
        read_u32(self.data.as_ref(), NEXT_FREE_OFFSET)
    }

    /// Returns true if every page is allocated.
    pub fn is_full(&self) -> bool {
        self.allocated_count() >= BITMAP_CAPACITY
    }

    /// Returns true if the page at `offset` is free.
    ///
    /// Offsets past the bitmap's capacity are never free.
    pub fn is_page_free(&self, offset: u32) -> bool {
        if offset >= BITMAP_CAPACITY {
            return false;
        }
        let (byte, mask) = Self::locate(offset);
        self.data.as_ref()[byte] & mask == 0
    }

    #[inline]
    fn locate(offset: u32) -> (usize, u8) {
        let byte = BITS_OFFSET + (offset / 8) as usize;
        let mask = 0x80u8 >> (offset % 8);
        (byte, mask)
    }

    fn find_free_from(&self, start: u32) -> u32 {
        (start..BITMAP_CAPACITY)
            .chain(0..start)
            .find(|off| self.is_page_free(*off))
            .unwrap_or(BITMAP_CAPACITY)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> BitmapPage<B> {
    /// Allocates the next free page, returning its offset.
    ///
    /// Returns None when the bitmap is full.
    pub fn allocate_page(&mut self) -> Option<u32> {
        if self.is_full() {
            return None;
        }

        let mut offset = self.next_free_page();
        if !self.is_page_free(offset) {
            offset = self.find_free_from(0);
            if offset >= BITMAP_CAPACITY {
                return None;
            }
        }

        let (byte, mask) = Self::locate(offset);
        let data = self.data.as_mut();
        data[byte] |= mask;
        let allocated = read_u32(data, ALLOCATED_OFFSET) + 1;
        write_u32(data, ALLOCATED_OFFSET, allocated);

        let next = self.find_free_from(offset);
        write_u32(self.data.as_mut(), NEXT_FREE_OFFSET, next);
        Some(offset)
    }

    /// Frees the page at `offset`.
    ///
    /// Returns false if the page was already free or out of range.
    pub fn deallocate_page(&mut self, offset: u32) -> bool {
        if offset >= BITMAP_CAPACITY || self.is_page_free(offset) {
            return false;
        }

        let (byte, mask) = Self::locate(offset);
        let data = self.data.as_mut();
        data[byte] &= !mask;
        let allocated = read_u32(data, ALLOCATED_OFFSET) - 1;
        write_u32(data, ALLOCATED_OFFSET, allocated);
        write_u32(data, NEXT_FREE_OFFSET, offset);
        true
    }
}
