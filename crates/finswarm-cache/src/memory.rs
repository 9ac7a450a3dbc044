use std::time::Duration;

use finswarm_models::CacheEntry;
use moka::future::Cache;

/// In-memory hot layer in front of the SQLite store, backed by moka.
///
/// Eviction here only drops the fast copy; the durable row stays in SQLite.
pub struct MemoryCache {
    inner: Cache<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, question: &str) -> Option<CacheEntry> {
        self.inner.get(question).await
    }

    pub async fn insert(&self, question: String, entry: CacheEntry) {
        self.inner.insert(question, entry).await;
    }
}
