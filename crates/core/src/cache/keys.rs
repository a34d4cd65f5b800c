//! Cache key policy.
//!
//! A captured page lives under two keys: the primary `url|<normalized url>`
//! key and a legacy key holding only the lowercase hostname. Reads prefer the
//! primary key; writes and deletes touch both. The two writes are not atomic.

use url::Url;

use super::kv::KvStore;
use super::record::CacheRecord;
use crate::Error;

/// Prefix of every primary capture key.
pub const URL_KEY_PREFIX: &str = "url|";

/// Singleton key holding the refresher's listing cursor.
pub const CRON_CURSOR_KEY: &str = "cron|cursor:url";

/// The keys under which one target is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeys {
    pub primary: String,
    pub legacy: Option<String>,
}

/// A record found during lookup, with the key it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found {
    pub key: String,
    pub record: CacheRecord,
    pub from_primary: bool,
}

impl CacheKeys {
    pub fn for_target(target: &Url) -> Self {
        let legacy = target.host_str().map(str::to_ascii_lowercase).filter(|h| !h.is_empty());
        Self { primary: format!("{URL_KEY_PREFIX}{target}"), legacy }
    }

    /// Keys in read order: primary first.
    pub fn read_order(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(self.legacy.as_deref())
    }

    /// Every key a write or delete must touch.
    pub fn write_keys(&self) -> Vec<&str> {
        self.read_order().collect()
    }

    pub fn is_primary(&self, key: &str) -> bool {
        key == self.primary
    }

    /// First non-empty record in read order.
    pub async fn lookup(&self, kv: &dyn KvStore) -> Result<Option<Found>, Error> {
        for key in self.read_order() {
            if let Some(raw) = kv.get(key).await? {
                let record = CacheRecord::parse(&raw);
                if record.is_empty() {
                    continue;
                }
                return Ok(Some(Found { key: key.to_string(), record, from_primary: self.is_primary(key) }));
            }
        }
        Ok(None)
    }

    /// Write `record` under every key. All keys are attempted; the first
    /// failure is returned.
    pub async fn write_all(&self, kv: &dyn KvStore, record: &CacheRecord) -> Result<(), Error> {
        let value = record.to_json();
        let mut first_err = None;
        for key in self.write_keys() {
            if let Err(e) = kv.put(key, &value).await {
                tracing::warn!(key, error = %e, "cache write failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Delete every key. All keys are attempted; the first failure is returned.
    pub async fn delete_all(&self, kv: &dyn KvStore) -> Result<(), Error> {
        let mut first_err = None;
        for key in self.write_keys() {
            if let Err(e) = kv.delete(key).await {
                tracing::warn!(key, error = %e, "cache delete failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Recover the normalized target string from a primary key.
pub fn target_from_primary(key: &str) -> Option<&str> {
    key.strip_prefix(URL_KEY_PREFIX).filter(|rest| !rest.is_empty())
}
