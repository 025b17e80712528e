//! Strata common types, errors, and configuration.
//!
//! This crate provides shared definitions used across all strata components.

pub mod config;
pub mod error;
pub mod page;

pub use config::StorageConfig;
pub use error::{Result, StrataError};
pub use page::{Lsn, PageId, INDEX_ROOTS_PAGE_ID, PAGE_SIZE};
