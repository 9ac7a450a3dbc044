//! Caching, retrying front for a slow retrieval backend.
//!
//! The backend is built lazily on first use. Concurrent first callers share a
//! single construction, which runs on the blocking pool. A failed
//! construction is remembered and reported as `BackendUnavailable` from then
//! on; a successful one is kept for the adapter's lifetime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use finswarm_cache::QueryCache;
use finswarm_models::{CacheEntry, QueryResult, RagConfig};
use tokio::sync::{Mutex, OnceCell};
use tracing::{error, info, warn};

use crate::error::AgentError;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq)]
pub struct SourceNode {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResponse {
    pub text: String,
    pub source_nodes: Vec<SourceNode>,
}

/// A ready retrieval engine: question in, answer plus supporting snippets out.
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    async fn query(&self, question: &str) -> Result<RetrievalResponse, AgentError>;
}

/// Expensive, blocking construction of a `RetrievalBackend`.
pub trait BackendFactory: Send + Sync {
    fn build(&self) -> Result<Arc<dyn RetrievalBackend>, AgentError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterInitState {
    Uninitialized,
    Initializing,
    Ready,
    /// Construction failed; the adapter stays unusable.
    Failed,
}

#[derive(Debug, Clone)]
pub struct AdapterOptions {
    pub retry: RetryPolicy,
    /// Per-attempt limit on the backend call. Expiry counts as a failed attempt.
    pub query_timeout: Option<Duration>,
    pub source_preview_chars: usize,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self::from(&RagConfig::default())
    }
}

impl From<&RagConfig> for AdapterOptions {
    fn from(config: &RagConfig) -> Self {
        Self {
            retry: RetryPolicy::new(
                config.max_attempts,
                Duration::from_millis(config.backoff_base_ms),
            ),
            query_timeout: config.query_timeout_seconds.map(Duration::from_secs),
            source_preview_chars: config.source_preview_chars,
        }
    }
}

/// Clears the `initializing` flag even if the initializing task is dropped.
struct InitializingFlag<'a>(&'a AtomicBool);

impl<'a> InitializingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for InitializingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ResilientQueryAdapter {
    factory: Arc<dyn BackendFactory>,
    backend: OnceCell<Arc<dyn RetrievalBackend>>,
    init_lock: Mutex<()>,
    initializing: AtomicBool,
    failure: OnceLock<String>,
    cache: Arc<QueryCache>,
    options: AdapterOptions,
}

impl ResilientQueryAdapter {
    pub fn new(
        factory: Arc<dyn BackendFactory>,
        cache: Arc<QueryCache>,
        options: AdapterOptions,
    ) -> Self {
        Self {
            factory,
            backend: OnceCell::new(),
            init_lock: Mutex::new(()),
            initializing: AtomicBool::new(false),
            failure: OnceLock::new(),
            cache,
            options,
        }
    }

    pub fn init_state(&self) -> AdapterInitState {
        if self.backend.initialized() {
            AdapterInitState::Ready
        } else if self.failure.get().is_some() {
            AdapterInitState::Failed
        } else if self.initializing.load(Ordering::SeqCst) {
            AdapterInitState::Initializing
        } else {
            AdapterInitState::Uninitialized
        }
    }

    /// Build the backend now instead of on the first cache miss.
    pub async fn initialize(&self) -> Result<(), AgentError> {
        self.ensure_ready().await.map(|_| ())
    }

    /// Answer `question` from the cache or the backend.
    ///
    /// Backend query failures that survive every retry come back as a marked
    /// fallback `QueryResult`, never as an error, and are not cached. Only
    /// `BackendUnavailable` is returned as `Err`.
    pub async fn query(&self, question: &str) -> Result<QueryResult, AgentError> {
        match self.cache.get(question).await {
            Ok(Some(entry)) => {
                info!(question, "Query (cache hit)");
                return Ok(entry.into());
            }
            Ok(None) => {}
            Err(e) => warn!(question, error = %e, "Cache read failed, querying backend"),
        }

        let backend = self.ensure_ready().await?;

        let start = Instant::now();
        let response = self
            .options
            .retry
            .run("rag_query", || self.query_once(&backend, question))
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e @ AgentError::BackendUnavailable(_)) => return Err(e),
            Err(e) => {
                error!(question, error = %e, "Retrieval failed, returning fallback");
                return Ok(QueryResult::fallback(format!(
                    "RAG engine connection failed: {e}"
                )));
            }
        };

        let result = QueryResult {
            answer: response.text,
            sources: response
                .source_nodes
                .iter()
                .map(|node| preview(&node.content, self.options.source_preview_chars))
                .collect(),
            latency_s: start.elapsed().as_secs_f64(),
            fallback: false,
        };
        info!(
            question,
            sources = result.sources.len(),
            latency_s = result.latency_s,
            "Query (backend)"
        );

        if let Err(e) = self.cache.put(question, &CacheEntry::from(&result)).await {
            warn!(question, error = %e, "Cache write failed");
        }

        Ok(result)
    }

    /// Blocking variant of `query` for callers with no async runtime.
    ///
    /// Must not be called from within a Tokio runtime.
    pub fn query_blocking(&self, question: &str) -> Result<QueryResult, AgentError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.query(question))
    }

    async fn query_once(
        &self,
        backend: &Arc<dyn RetrievalBackend>,
        question: &str,
    ) -> Result<RetrievalResponse, AgentError> {
        match self.options.query_timeout {
            Some(limit) => tokio::time::timeout(limit, backend.query(question))
                .await
                .map_err(|_| AgentError::Timeout(limit.as_secs()))?,
            None => backend.query(question).await,
        }
    }

    async fn ensure_ready(&self) -> Result<Arc<dyn RetrievalBackend>, AgentError> {
        if let Some(backend) = self.ready_or_failed()? {
            return Ok(backend);
        }

        let _guard = self.init_lock.lock().await;
        // Whoever held the lock before us may have finished the job.
        if let Some(backend) = self.ready_or_failed()? {
            return Ok(backend);
        }

        let _flag = InitializingFlag::raise(&self.initializing);
        info!("Initializing retrieval backend");
        let started = Instant::now();

        let factory = Arc::clone(&self.factory);
        let built = match tokio::task::spawn_blocking(move || factory.build()).await {
            Ok(result) => result,
            Err(e) => Err(AgentError::BackendUnavailable(format!(
                "initialization task failed: {e}"
            ))),
        };

        match built {
            Ok(backend) => {
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Retrieval backend ready"
                );
                let _ = self.backend.set(Arc::clone(&backend));
                Ok(backend)
            }
            Err(e) => {
                let reason = match e {
                    AgentError::BackendUnavailable(reason) => reason,
                    other => other.to_string(),
                };
                error!(reason = %reason, "Retrieval backend initialization failed");
                let _ = self.failure.set(reason.clone());
                Err(AgentError::BackendUnavailable(reason))
            }
        }
    }

    fn ready_or_failed(&self) -> Result<Option<Arc<dyn RetrievalBackend>>, AgentError> {
        if let Some(backend) = self.backend.get() {
            return Ok(Some(Arc::clone(backend)));
        }
        match self.failure.get() {
            Some(reason) => Err(AgentError::BackendUnavailable(reason.clone())),
            None => Ok(None),
        }
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
