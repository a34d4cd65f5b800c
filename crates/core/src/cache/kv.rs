//! Key-value operations over the `kv` table.
//!
//! Values are opaque strings. Listing walks keys in lexicographic order and
//! hands back the last key of the page as the continuation cursor.

use async_trait::async_trait;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::OptionalExtension;

use super::connection::CacheDb;
use crate::Error;

/// One page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Pass back to `list` to continue; `None` once the listing is complete.
    pub cursor: Option<String>,
    pub list_complete: bool,
}

/// Minimal string key-value store used by the capture cache and refresher.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;

    async fn put(&self, key: &str, value: &str) -> Result<(), Error>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), Error>;

    /// List keys starting with `prefix`, at most `limit` per page.
    async fn list(&self, prefix: &str, cursor: Option<&str>, limit: usize) -> Result<ListPage, Error>;
}

#[async_trait]
impl KvStore for CacheDb {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let value = conn
                    .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
                    .optional()?;
                Ok(value)
            })
            .await
            .map_err(Error::from)
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), Error> {
        let key = key.to_string();
        let value = value.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at",
                    params![key, value, chrono::Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn list(&self, prefix: &str, cursor: Option<&str>, limit: usize) -> Result<ListPage, Error> {
        let prefix = prefix.to_string();
        let after = cursor.unwrap_or("").to_string();
        let limit = limit.max(1);
        let fetch = i64::try_from(limit).unwrap_or(i64::MAX - 1) + 1;

        let mut keys = self
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT key FROM kv
                     WHERE substr(key, 1, length(?1)) = ?1 AND key > ?2
                     ORDER BY key
                     LIMIT ?3",
                )?;
                let rows = stmt.query_map(params![prefix, after, fetch], |row| row.get::<_, String>(0))?;
                let mut keys = Vec::new();
                for key in rows {
                    keys.push(key?);
                }
                Ok(keys)
            })
            .await
            .map_err(Error::from)?;

        let list_complete = keys.len() <= limit;
        keys.truncate(limit);
        let cursor = if list_complete { None } else { keys.last().cloned() };

        Ok(ListPage { keys, cursor, list_complete })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded(keys: &[&str]) -> CacheDb {
        let db = CacheDb::open_in_memory().await.unwrap();
        for key in keys {
            db.put(key, "v").await.unwrap();
        }
        db
    }

    #[tokio::test]
    async fn test_put_get_overwrite() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert_eq!(db.get("a").await.unwrap(), None);

        db.put("a", "1").await.unwrap();
        db.put("a", "2").await.unwrap();
        assert_eq!(db.get("a").await.unwrap(), Some("2".to_string()));
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let db = seeded(&["a"]).await;
        db.delete("a").await.unwrap();
        db.delete("a").await.unwrap();
        assert_eq!(db.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_filters_prefix() {
        let db = seeded(&["url|https://a.dev/", "legacy.dev", "url|https://b.dev/", "cron|cursor:url"]).await;
        let page = db.list("url|", None, 10).await.unwrap();
        assert_eq!(page.keys, vec!["url|https://a.dev/", "url|https://b.dev/"]);
        assert!(page.list_complete);
        assert!(page.cursor.is_none());
    }

    #[tokio::test]
    async fn test_list_prefix_is_literal() {
        let db = seeded(&["a_c", "abc"]).await;
        let page = db.list("a_", None, 10).await.unwrap();
        assert_eq!(page.keys, vec!["a_c"]);
    }

    #[tokio::test]
    async fn test_list_paginates_with_cursor() {
        let db = seeded(&["p|1", "p|2", "p|3", "p|4", "p|5"]).await;

        let first = db.list("p|", None, 2).await.unwrap();
        assert_eq!(first.keys, vec!["p|1", "p|2"]);
        assert!(!first.list_complete);
        assert_eq!(first.cursor.as_deref(), Some("p|2"));

        let second = db.list("p|", first.cursor.as_deref(), 2).await.unwrap();
        assert_eq!(second.keys, vec!["p|3", "p|4"]);

        let third = db.list("p|", second.cursor.as_deref(), 2).await.unwrap();
        assert_eq!(third.keys, vec!["p|5"]);
        assert!(third.list_complete);
        assert!(third.cursor.is_none());
    }

    #[tokio::test]
    async fn test_list_exact_page_is_complete() {
        let db = seeded(&["p|1", "p|2"]).await;
        let page = db.list("p|", None, 2).await.unwrap();
        assert_eq!(page.keys.len(), 2);
        assert!(page.list_complete);
    }
}
