use serde::{Deserialize, Serialize};

/// Top-level configuration for finswarm.
///
/// Every section is optional in TOML; missing sections and fields take defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FinswarmConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// How agents reach the language model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    /// Executable invoked for each model call.
    #[serde(default = "default_llm_command")]
    pub command: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
    /// Total attempts per model call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            command: default_llm_command(),
            model: default_llm_model(),
            timeout_seconds: default_llm_timeout(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

/// Retrieval backend and resilient adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Markdown document the index is built from.
    #[serde(default = "default_rag_data_path")]
    pub data_path: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Soft upper bound on chunk size when splitting the document.
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    /// Characters kept from each supporting source snippet.
    #[serde(default = "default_source_preview_chars")]
    pub source_preview_chars: usize,
    /// Per-attempt backend timeout. `None` waits indefinitely.
    #[serde(default)]
    pub query_timeout_seconds: Option<u64>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            data_path: default_rag_data_path(),
            top_k: default_top_k(),
            chunk_chars: default_chunk_chars(),
            source_preview_chars: default_source_preview_chars(),
            query_timeout_seconds: None,
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

/// Configuration for the durable query cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Path to the SQLite cache file. Survives restarts.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    /// Maximum number of entries in the in-memory moka cache.
    #[serde(default = "default_memory_capacity")]
    pub memory_max_capacity: u64,
    /// How long a read stays in memory before falling back to SQLite.
    #[serde(default = "default_memory_ttl")]
    pub memory_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
            memory_max_capacity: default_memory_capacity(),
            memory_ttl_seconds: default_memory_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphConfig {
    /// Maximum node executions per run.
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: u32,
    /// User queries longer than this are truncated.
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            recursion_limit: default_recursion_limit(),
            max_query_chars: default_max_query_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Where chart artifacts are written.
    #[serde(default = "default_output_dir")]
    pub dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_llm_command() -> String {
    "claude".to_string()
}
fn default_llm_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}
fn default_llm_timeout() -> u64 {
    120
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    1000
}
fn default_rag_data_path() -> String {
    "data/parsed/parsed.md".to_string()
}
fn default_top_k() -> usize {
    3
}
fn default_chunk_chars() -> usize {
    800
}
fn default_source_preview_chars() -> usize {
    100
}
fn default_sqlite_path() -> String {
    "data/rag_cache.db".to_string()
}
fn default_memory_capacity() -> u64 {
    10_000
}
fn default_memory_ttl() -> u64 {
    3600
}
fn default_recursion_limit() -> u32 {
    20
}
fn default_max_query_chars() -> usize {
    500
}
fn default_output_dir() -> String {
    "output".to_string()
}
