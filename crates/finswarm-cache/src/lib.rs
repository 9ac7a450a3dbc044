pub mod error;
pub mod memory;
pub mod query_cache;
pub mod sqlite;

pub use error::CacheError;
pub use query_cache::QueryCache;
pub use sqlite::SqliteStore;
