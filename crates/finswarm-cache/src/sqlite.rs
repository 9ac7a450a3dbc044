use chrono::Utc;
use finswarm_models::cache_schema::{CacheRow, CACHE_TABLE_DDL};
use rusqlite::{Connection, OptionalExtension};

use crate::error::CacheError;

/// Durable key-value store for query results.
///
/// Keys are exact question strings. Rows never expire, so the cache survives
/// process restarts.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the cache database at `path`. Enables WAL mode.
    pub fn open(path: &str) -> Result<Self, CacheError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(CACHE_TABLE_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database. Useful for testing.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CACHE_TABLE_DDL)?;
        Ok(Self { conn })
    }

    pub fn get(&self, question: &str) -> Result<Option<CacheRow>, CacheError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT question, value_json, created_at, updated_at \
             FROM query_cache WHERE question = ?1",
        )?;

        let row = stmt
            .query_row(rusqlite::params![question], |row| {
                Ok(CacheRow {
                    question: row.get(0)?,
                    value_json: row.get(1)?,
                    created_at: row.get(2)?,
                    updated_at: row.get(3)?,
                })
            })
            .optional()?;

        Ok(row)
    }

    /// Insert or overwrite the value for `question`. Re-writing the same value is harmless.
    pub fn put(&self, question: &str, value_json: &str) -> Result<(), CacheError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO query_cache (question, value_json, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?3) \
             ON CONFLICT(question) DO UPDATE SET \
             value_json = excluded.value_json, updated_at = excluded.updated_at",
            rusqlite::params![question, value_json, now],
        )?;
        Ok(())
    }

    pub fn count(&self) -> Result<usize, CacheError> {
        let count: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM query_cache", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALUE: &str = r#"{"answer":"42","sources":[],"latency_s":0.1}"#;

    #[test]
    fn get_existing_key() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put("What was revenue in 2023?", VALUE).unwrap();

        let row = store.get("What was revenue in 2023?").unwrap().unwrap();
        assert_eq!(row.value_json, VALUE);
        assert_eq!(row.created_at, row.updated_at);
    }

    #[test]
    fn get_missing_key() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get("nonexistent").unwrap().is_none());
    }

    #[test]
    fn put_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put("q", VALUE).unwrap();
        store.put("q", VALUE).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get("q").unwrap().unwrap().value_json, VALUE);
    }

    #[test]
    fn keys_are_not_normalized() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put("Revenue?", VALUE).unwrap();

        assert!(store.get("revenue?").unwrap().is_none());
        assert!(store.get(" Revenue?").unwrap().is_none());
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rag_cache.db");
        let path = path.to_str().unwrap();

        {
            let store = SqliteStore::open(path).unwrap();
            store.put("q", VALUE).unwrap();
        }

        let reopened = SqliteStore::open(path).unwrap();
        assert_eq!(reopened.get("q").unwrap().unwrap().value_json, VALUE);
    }
}
