/// The SQLite schema backing the durable query cache.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS query_cache (
///     question    TEXT PRIMARY KEY,
///     value_json  TEXT NOT NULL,
///     created_at  TEXT NOT NULL,
///     updated_at  TEXT NOT NULL
/// );
/// ```
///
/// `question` is the exact query text, no normalization. `value_json` holds a
/// serialized `CacheEntry`. Entries have no expiry.
pub const CACHE_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS query_cache (
    question    TEXT PRIMARY KEY,
    value_json  TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
";

/// A raw cache row as read from SQLite.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRow {
    pub question: String,
    pub value_json: String,
    pub created_at: String,
    pub updated_at: String,
}
