use serde::{Deserialize, Serialize};

/// Prefix marking a degraded answer produced after the retrieval backend failed.
pub const FALLBACK_PREFIX: &str = "Error:";

/// A successful retrieval, as persisted in the query cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub answer: String,
    /// Supporting snippets, in backend rank order, truncated to a preview length.
    pub sources: Vec<String>,
    /// Seconds spent on the backend call that produced this entry.
    pub latency_s: f64,
}

/// What a query returns to the caller: either a real answer or a marked fallback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    pub answer: String,
    pub sources: Vec<String>,
    pub latency_s: f64,
    /// True when this is a degraded result; `answer` then starts with `FALLBACK_PREFIX`.
    #[serde(default)]
    pub fallback: bool,
}

impl QueryResult {
    pub fn fallback(message: impl AsRef<str>) -> Self {
        Self {
            answer: format!("{FALLBACK_PREFIX} {}", message.as_ref()),
            sources: Vec::new(),
            latency_s: 0.0,
            fallback: true,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }
}

impl From<CacheEntry> for QueryResult {
    fn from(entry: CacheEntry) -> Self {
        Self {
            answer: entry.answer,
            sources: entry.sources,
            latency_s: entry.latency_s,
            fallback: false,
        }
    }
}

impl From<&QueryResult> for CacheEntry {
    fn from(result: &QueryResult) -> Self {
        Self {
            answer: result.answer.clone(),
            sources: result.sources.clone(),
            latency_s: result.latency_s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_is_marked_twice() {
        let result = QueryResult::fallback("RAG engine connection failed: timeout");
        assert!(result.is_fallback());
        assert!(result.answer.starts_with(FALLBACK_PREFIX));
        assert!(result.sources.is_empty());
        assert_eq!(result.latency_s, 0.0);
    }

    #[test]
    fn cache_entry_converts_to_genuine_result() {
        let entry = CacheEntry {
            answer: "Revenue was $60.9B".to_string(),
            sources: vec!["Total revenue 60,922".to_string()],
            latency_s: 1.5,
        };
        let result = QueryResult::from(entry.clone());
        assert!(!result.is_fallback());
        assert_eq!(CacheEntry::from(&result), entry);
    }
}
