//! Buffer pool management for strata.
//!
//! This crate provides in-memory page caching with:
//! - Fixed-size buffer pool with configurable page count
//! - Least-recently-unpinned eviction behind a pluggable `Replacer`
//! - Pin counting through `PageGuard` leases
//! - Dirty page tracking for write-back to a `BlockStore`

mod frame;
mod page_table;
mod pool;
mod replacer;
mod store;

pub use frame::{BufferFrame, FrameId};
pub use page_table::PageTable;
pub use pool::{BufferPool, BufferPoolConfig, BufferPoolStats, PageGuard};
pub use replacer::{LruReplacer, Replacer};
pub use store::{BlockStore, MemoryBlockStore};
