//! Configuration structures for the strata storage core.

use crate::error::{Result, StrataError};
use crate::page::PAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration for a strata engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file holding every page.
    pub data_file: PathBuf,
    /// Buffer pool size in number of pages.
    pub buffer_pool_pages: usize,
    /// Enable fsync after page writes.
    pub fsync_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("./data/strata.db"),
            buffer_pool_pages: 1024, // 4 MB with 4 KB pages
            fsync_enabled: true,
        }
    }
}

impl StorageConfig {
    /// Returns the total buffer pool size in bytes.
    pub fn buffer_pool_size_bytes(&self) -> usize {
        self.buffer_pool_pages * PAGE_SIZE
    }

    /// Checks that the configuration describes a usable engine.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_pool_pages == 0 {
            return Err(StrataError::InvalidParameter {
                name: "buffer_pool_pages".to_string(),
                value: self.buffer_pool_pages.to_string(),
            });
        }
        if self.data_file.as_os_str().is_empty() {
            return Err(StrataError::ConfigError(
                "data_file must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
