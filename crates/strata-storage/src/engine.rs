//! Storage engine context.
//!
//! Owns the disk manager and the buffer pool on top of it, and hands out
//! index handles bound to that pool. One engine corresponds to one
//! database file.

use std::sync::Arc;

use strata_buffer::{BlockStore, BufferPool, BufferPoolConfig, BufferPoolStats};
use strata_common::{Result, StorageConfig};
use tracing::info;

use crate::btree::{bootstrap_roots_page, BPlusTree, BPlusTreeConfig};
use crate::disk::{DiskManager, DiskManagerConfig};

/// Disk, buffer pool and index roots for one database file.
pub struct StorageEngine {
    config: StorageConfig,
    disk: Arc<DiskManager>,
    pool: Arc<BufferPool>,
}

impl StorageEngine {
    /// Opens or creates the database file named by `config`.
    ///
    /// A fresh file gets an empty roots directory on logical page 0. An
    /// existing file must carry a valid one.
    pub fn open(config: StorageConfig) -> Result<Self> {
        config.validate()?;

        let disk = Arc::new(DiskManager::open(DiskManagerConfig {
            path: config.data_file.clone(),
            fsync_enabled: config.fsync_enabled,
        })?);
        let pool_config = BufferPoolConfig {
            num_frames: config.buffer_pool_pages,
        };
        pool_config.validate()?;
        let store: Arc<dyn BlockStore> = disk.clone();
        let pool = Arc::new(BufferPool::new(pool_config, store));

        bootstrap_roots_page(&pool)?;
        info!(
            path = %config.data_file.display(),
            frames = config.buffer_pool_pages,
            allocated_pages = disk.num_allocated_pages(),
            "storage engine opened"
        );

        Ok(Self { config, disk, pool })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn disk(&self) -> &Arc<DiskManager> {
        &self.disk
    }

    /// Opens index `index_id` on this engine's buffer pool.
    pub fn open_index(&self, index_id: u32, config: BPlusTreeConfig) -> Result<BPlusTree> {
        BPlusTree::open(index_id, Arc::clone(&self.pool), config)
    }

    pub fn stats(&self) -> BufferPoolStats {
        self.pool.stats()
    }

    /// Writes every dirty page and syncs the file.
    pub fn flush(&self) -> Result<()> {
        self.pool.flush_all()?;
        self.disk.flush()
    }
}
