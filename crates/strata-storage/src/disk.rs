//! Disk manager for page-level file I/O.
//!
//! All pages of a database live in a single file. Allocation is tracked by
//! bitmap pages, each covering an extent of `BITMAP_CAPACITY` data pages:
//!
//! ```text
//! +-----------+----------+-------------------+----------+-----------------
//! | meta page | bitmap 0 | extent 0 data ... | bitmap 1 | extent 1 data ...
//! +-----------+----------+-------------------+----------+-----------------
//! ```
//!
//! Callers only ever see logical page ids, which number the data pages
//! densely from zero.

use crate::bitmap::{BitmapPage, BITMAP_CAPACITY};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use strata_buffer::BlockStore;
use strata_common::page::{read_u32, write_u32, PageId, PAGE_SIZE};
use strata_common::{Result, StrataError};
use tracing::debug;

/// Magic number identifying a strata database file.
pub const DISK_META_MAGIC: u32 = 0x5354_5241;

/// Maximum number of extents the meta page can describe.
pub const MAX_EXTENTS: usize = (PAGE_SIZE - DiskMeta::HEADER_SIZE) / 4;

/// Configuration for the disk manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskManagerConfig {
    /// Database file path.
    pub path: PathBuf,
    /// Enable fsync after writes.
    pub fsync_enabled: bool,
}

impl Default for DiskManagerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/strata.db"),
            fsync_enabled: true,
        }
    }
}

/// Contents of the meta page (physical page 0).
///
/// Layout:
/// - magic: 4 bytes
/// - num_allocated_pages: 4 bytes
/// - num_extents: 4 bytes
/// - extent_used_pages: 4 bytes per extent
#[derive(Debug, Clone, PartialEq, Eq)]
struct DiskMeta {
    num_allocated_pages: u32,
    extent_used_pages: Vec<u32>,
}

impl DiskMeta {
    const HEADER_SIZE: usize = 12;

    fn new() -> Self {
        Self {
            num_allocated_pages: 0,
            extent_used_pages: Vec::new(),
        }
    }

    fn to_bytes(&self) -> [u8; PAGE_SIZE] {
        let mut buf = [0u8; PAGE_SIZE];
        write_u32(&mut buf, 0, DISK_META_MAGIC);
        write_u32(&mut buf, 4, self.num_allocated_pages);
        write_u32(&mut buf, 8, self.extent_used_pages.len() as u32);
        for (i, used) in self.extent_used_pages.iter().enumerate() {
            write_u32(&mut buf, Self::HEADER_SIZE + i * 4, *used);
        }
        buf
    }

    fn from_bytes(buf: &[u8; PAGE_SIZE]) -> Result<Self> {
        let magic = read_u32(buf, 0);
        if magic != DISK_META_MAGIC {
            return Err(StrataError::PageCorrupted {
                page_id: 0,
                reason: format!("bad disk meta magic {magic:#010x}"),
            });
        }

        let num_extents = read_u32(buf, 8) as usize;
        if num_extents > MAX_EXTENTS {
            return Err(StrataError::PageCorrupted {
                page_id: 0,
                reason: format!("extent count {num_extents} exceeds {MAX_EXTENTS}"),
            });
        }

        let extent_used_pages = (0..num_extents)
            .map(|i| read_u32(buf, Self::HEADER_SIZE + i * 4))
            .collect();

        Ok(Self {
            num_allocated_pages: read_u32(buf, 4),
            extent_used_pages,
        })
    }
}

/// Manages reading, writing and allocating pages in the database file.
pub struct DiskManager {
    /// Configuration.
    config: DiskManagerConfig,
    /// File handle and allocation metadata.
    inner: Mutex<DiskInner>,
}

struct DiskInner {
    file: File,
    meta: DiskMeta,
}

impl DiskManager {
    /// Opens the database file, creating and formatting it if empty.
    ///
    /// Fails with `PageCorrupted` if an existing file does not carry the
    /// strata magic number.
    pub fn open(config: DiskManagerConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&config.path)?;

        let meta = if file.metadata()?.len() == 0 {
            let meta = DiskMeta::new();
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&meta.to_bytes())?;
            if config.fsync_enabled {
                file.sync_all()?;
            }
            debug!(path = %config.path.display(), "formatted new database file");
            meta
        } else {
            let mut buf = [0u8; PAGE_SIZE];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut buf)?;
            DiskMeta::from_bytes(&buf)?
        };

        Ok(Self {
            config,
            inner: Mutex::new(DiskInner { file, meta }),
        })
    }

    /// Returns the database file path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Number of logical pages currently allocated.
    pub fn num_allocated_pages(&self) -> u32 {
        self.inner.lock().meta.num_allocated_pages
    }

    /// Number of extents (bitmap pages) in the file.
    pub fn num_extents(&self) -> usize {
        self.inner.lock().meta.extent_used_pages.len()
    }

    /// Physical page holding the bitmap of `extent`.
    #[inline]
    fn bitmap_physical(extent: u32) -> u64 {
        1 + extent as u64 * (BITMAP_CAPACITY as u64 + 1)
    }

    /// Physical page holding logical page `page_id`.
    #[inline]
    fn map_page_id(page_id: PageId) -> u64 {
        let extent = page_id.0 / BITMAP_CAPACITY;
        let offset = page_id.0 % BITMAP_CAPACITY;
        Self::bitmap_physical(extent) + 1 + offset as u64
    }

    fn read_physical(file: &mut File, physical: u64, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        let offset = physical * PAGE_SIZE as u64;
        if offset >= file.metadata()?.len() {
            buf.fill(0);
            return Ok(());
        }
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_physical(&self, file: &mut File, physical: u64, buf: &[u8; PAGE_SIZE]) -> Result<()> {
        file.seek(SeekFrom::Start(physical * PAGE_SIZE as u64))?;
        file.write_all(buf)?;
        if self.config.fsync_enabled {
            file.sync_data()?;
        }
        Ok(())
    }

    fn write_meta(&self, inner: &mut DiskInner) -> Result<()> {
        let bytes = inner.meta.to_bytes();
        self.write_physical(&mut inner.file, 0, &bytes)
    }
}

impl BlockStore for DiskManager {
    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        if !page_id.is_valid() {
            return Err(StrataError::PageNotFound { page_id: page_id.0 });
        }
        let mut inner = self.inner.lock();
        Self::read_physical(&mut inner.file, Self::map_page_id(page_id), buf)
    }

    fn write_page(&self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<()> {
        if !page_id.is_valid() {
            return Err(StrataError::PageNotFound { page_id: page_id.0 });
        }
        let mut inner = self.inner.lock();
        self.write_physical(&mut inner.file, Self::map_page_id(page_id), buf)
    }

    fn allocate_page(&self) -> Result<PageId> {
        let mut inner = self.inner.lock();

        let extent_index = match inner
            .meta
            .extent_used_pages
            .iter()
            .position(|used| *used < BITMAP_CAPACITY)
        {
            Some(extent) => extent,
            None if inner.meta.extent_used_pages.len() < MAX_EXTENTS => {
                inner.meta.extent_used_pages.push(0);
                inner.meta.extent_used_pages.len() - 1
            }
            None => return Err(StrataError::OutOfSpace),
        };
        let extent = extent_index as u32;

        let bitmap_page = Self::bitmap_physical(extent);
        let mut buf = [0u8; PAGE_SIZE];
        Self::read_physical(&mut inner.file, bitmap_page, &mut buf)?;
        let offset = BitmapPage::new(&mut buf[..]).allocate_page().ok_or_else(|| {
            StrataError::Internal(format!("extent {extent} bitmap full but meta reports room"))
        })?;
        self.write_physical(&mut inner.file, bitmap_page, &buf)?;

        inner.meta.extent_used_pages[extent_index] += 1;
        inner.meta.num_allocated_pages += 1;
        self.write_meta(&mut inner)?;

        let page_id = PageId(extent * BITMAP_CAPACITY + offset);
        // Extend the file and clear any stale contents of a reused page.
        self.write_physical(&mut inner.file, Self::map_page_id(page_id), &[0u8; PAGE_SIZE])?;

        Ok(page_id)
    }

    fn deallocate_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Ok(false);
        }
        let mut inner = self.inner.lock();

        let extent = page_id.0 / BITMAP_CAPACITY;
        if extent as usize >= inner.meta.extent_used_pages.len() {
            return Ok(false);
        }

        let bitmap_page = Self::bitmap_physical(extent);
        let mut buf = [0u8; PAGE_SIZE];
        Self::read_physical(&mut inner.file, bitmap_page, &mut buf)?;
        if !BitmapPage::new(&mut buf[..]).deallocate_page(page_id.0 % BITMAP_CAPACITY) {
            debug!(page_id = page_id.0, "deallocate of a free page ignored");
            return Ok(false);
        }
        self.write_physical(&mut inner.file, bitmap_page, &buf)?;

        inner.meta.extent_used_pages[extent as usize] -= 1;
        inner.meta.num_allocated_pages -= 1;
        self.write_meta(&mut inner)?;
        Ok(true)
    }

    fn is_page_free(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Ok(false);
        }
        let mut inner = self.inner.lock();

        let extent = page_id.0 / BITMAP_CAPACITY;
        if extent as usize >= inner.meta.extent_used_pages.len() {
            return Ok(true);
        }

        let mut buf = [0u8; PAGE_SIZE];
        Self::read_physical(&mut inner.file, Self::bitmap_physical(extent), &mut buf)?;
        Ok(BitmapPage::new(&buf[..]).is_page_free(page_id.0 % BITMAP_CAPACITY))
    }

    fn flush(&self) -> Result<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.inner.lock().file.sync_all();
    }
}
