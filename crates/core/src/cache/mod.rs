//! SQLite-backed key-value store for capture records.
//!
//! The capture cache maps a page key to a small JSON record naming the
//! hosted image. Access goes through the [`KvStore`] trait so the server
//! can be tested against other backends. Features:
//!
//! - Prefix listing with an opaque continuation cursor
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod connection;
pub mod keys;
pub mod kv;
pub mod migrations;
pub mod record;

pub use crate::Error;

pub use connection::CacheDb;
pub use keys::{CRON_CURSOR_KEY, CacheKeys, Found, URL_KEY_PREFIX, target_from_primary};
pub use kv::{KvStore, ListPage};
pub use record::CacheRecord;
