//! Core types and shared functionality for capcache.
//!
//! This crate provides:
//! - Key-value cache store with SQLite backend and the dual cache-key policy
//! - Per-request deadline budgeting
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod deadline;
pub mod error;

pub use cache::{CRON_CURSOR_KEY, CacheDb, CacheKeys, CacheRecord, KvStore, ListPage, URL_KEY_PREFIX};
pub use config::AppConfig;
pub use deadline::Deadline;
pub use error::Error;
