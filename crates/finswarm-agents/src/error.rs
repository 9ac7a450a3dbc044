use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Model CLI error: {0}")]
    Cli(String),

    #[error("Agent response parse error: {0}")]
    Parse(String),

    /// Structured payload could not be recovered by any parse stage.
    #[error("Malformed payload: {preview}")]
    MalformedPayload { preview: String },

    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    /// Transient retrieval failure. Retried, then degraded to a fallback.
    #[error("Backend query failed: {0}")]
    BackendQuery(String),

    /// The retrieval backend cannot be built. Not retried.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cache error: {0}")]
    Cache(#[from] finswarm_cache::CacheError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            AgentError::BackendUnavailable(_)
                | AgentError::Validation(_)
                | AgentError::MalformedPayload { .. }
        )
    }
}
