use std::sync::{Arc, Mutex};
use std::time::Duration;

use finswarm_models::CacheEntry;
use tracing::debug;

use crate::error::CacheError;
use crate::memory::MemoryCache;
use crate::sqlite::SqliteStore;

/// Read-through / write-through query cache: moka (hot) → SQLite (durable).
///
/// SQLite hits are promoted to moka. All SQLite work runs on the blocking
/// pool via `spawn_blocking` so cache I/O never stalls async tasks.
///
/// SQLite access is synchronized via `Mutex` since `rusqlite::Connection` is not `Sync`.
pub struct QueryCache {
    memory: MemoryCache,
    sqlite: Arc<Mutex<SqliteStore>>,
}

impl QueryCache {
    pub fn new(sqlite: SqliteStore, max_capacity: u64, memory_ttl: Duration) -> Self {
        Self {
            memory: MemoryCache::new(max_capacity, memory_ttl),
            sqlite: Arc::new(Mutex::new(sqlite)),
        }
    }

    /// Look up an entry by exact question text.
    pub async fn get(&self, question: &str) -> Result<Option<CacheEntry>, CacheError> {
        if let Some(entry) = self.memory.get(question).await {
            return Ok(Some(entry));
        }

        let sqlite = Arc::clone(&self.sqlite);
        let key = question.to_string();
        let row = tokio::task::spawn_blocking(move || {
            let sqlite = sqlite
                .lock()
                .map_err(|e| CacheError::Unavailable(format!("SQLite mutex poisoned: {e}")))?;
            sqlite.get(&key)
        })
        .await
        .map_err(|e| CacheError::Unavailable(format!("Cache task failed: {e}")))??;

        match row {
            Some(row) => {
                let entry: CacheEntry = serde_json::from_str(&row.value_json)?;
                debug!(question, "Promoting SQLite cache hit to memory");
                self.memory.insert(question.to_string(), entry.clone()).await;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// Store an entry in both layers.
    pub async fn put(&self, question: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        let value_json = serde_json::to_string(entry)?;

        let sqlite = Arc::clone(&self.sqlite);
        let key = question.to_string();
        tokio::task::spawn_blocking(move || {
            let sqlite = sqlite
                .lock()
                .map_err(|e| CacheError::Unavailable(format!("SQLite mutex poisoned: {e}")))?;
            sqlite.put(&key, &value_json)
        })
        .await
        .map_err(|e| CacheError::Unavailable(format!("Cache task failed: {e}")))??;

        self.memory.insert(question.to_string(), entry.clone()).await;
        Ok(())
    }

    /// Number of durable entries.
    pub async fn count(&self) -> Result<usize, CacheError> {
        let sqlite = Arc::clone(&self.sqlite);
        tokio::task::spawn_blocking(move || {
            let sqlite = sqlite
                .lock()
                .map_err(|e| CacheError::Unavailable(format!("SQLite mutex poisoned: {e}")))?;
            sqlite.count()
        })
        .await
        .map_err(|e| CacheError::Unavailable(format!("Cache task failed: {e}")))?
    }
}
