//! Deterministic stand-ins for the model and the retrieval backend.
//!
//! `ScriptedModel` replays a fixed list of replies in order, so a graph run
//! can be driven turn by turn. `MockBackend` and `MockBackendFactory` count
//! every call, which lets tests assert on caching, retry and single-flight
//! behaviour of `ResilientQueryAdapter`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use finswarm_models::{Message, ToolCallRecord};
use tokio::time::Instant;

use crate::error::AgentError;
use crate::llm::{ChatModel, ModelReply};
use crate::rag_adapter::{BackendFactory, RetrievalBackend, RetrievalResponse, SourceNode};

/// Replays canned replies; errors once the script runs out.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<ModelReply>>,
    fail_first: u32,
    calls: AtomicU32,
    transcripts: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    pub fn new<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_replies(texts.into_iter().map(ModelReply::text))
    }

    pub fn from_replies(replies: impl IntoIterator<Item = ModelReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        }
    }

    /// The first `n` invocations fail with a CLI error before the script starts.
    pub fn failing_first(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every conversation the model was invoked with, in call order.
    pub fn transcripts(&self) -> Vec<Vec<Message>> {
        self.transcripts
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn invoke(&self, messages: &[Message]) -> Result<ModelReply, AgentError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut transcripts) = self.transcripts.lock() {
            transcripts.push(messages.to_vec());
        }
        if n < self.fail_first {
            return Err(AgentError::Cli("scripted failure".to_string()));
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front())
            .ok_or_else(|| AgentError::Cli("script exhausted".to_string()))
    }
}

/// A native tool call, as a provider with structured tool support would return it.
pub fn native_call(name: &str, args: serde_json::Value) -> ToolCallRecord {
    let args = match args {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    ToolCallRecord::new(name, args)
}

/// Retrieval backend returning a fixed answer, optionally failing or slow.
pub struct MockBackend {
    answer: String,
    sources: Vec<String>,
    fail_first: u32,
    delay: Option<Duration>,
    calls: AtomicU32,
    call_times: Mutex<Vec<Instant>>,
}

impl MockBackend {
    pub fn new<I, S>(answer: impl Into<String>, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answer: answer.into(),
            sources: sources.into_iter().map(Into::into).collect(),
            fail_first: 0,
            delay: None,
            calls: AtomicU32::new(0),
            call_times: Mutex::new(Vec::new()),
        }
    }

    pub fn always_failing() -> Self {
        Self::new("unreachable", Vec::<String>::new()).failing_first(u32::MAX)
    }

    pub fn failing_first(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RetrievalBackend for MockBackend {
    async fn query(&self, _question: &str) -> Result<RetrievalResponse, AgentError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut times) = self.call_times.lock() {
            times.push(Instant::now());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if n < self.fail_first {
            return Err(AgentError::BackendQuery("connection refused".to_string()));
        }
        Ok(RetrievalResponse {
            text: self.answer.clone(),
            source_nodes: self
                .sources
                .iter()
                .map(|content| SourceNode {
                    content: content.clone(),
                })
                .collect(),
        })
    }
}

/// Hands out one shared `MockBackend` and counts constructions.
pub struct MockBackendFactory {
    backend: Option<Arc<MockBackend>>,
    missing_path: Option<String>,
    build_delay: Duration,
    builds: AtomicU32,
}

impl MockBackendFactory {
    pub fn new(backend: Arc<MockBackend>) -> Self {
        Self {
            backend: Some(backend),
            missing_path: None,
            build_delay: Duration::ZERO,
            builds: AtomicU32::new(0),
        }
    }

    /// A factory whose data source does not exist.
    pub fn missing_data(path: &str) -> Self {
        Self {
            backend: None,
            missing_path: Some(path.to_string()),
            build_delay: Duration::ZERO,
            builds: AtomicU32::new(0),
        }
    }

    /// Blocks the building thread for `delay`, like loading an index would.
    pub fn with_build_delay(mut self, delay: Duration) -> Self {
        self.build_delay = delay;
        self
    }

    pub fn builds(&self) -> u32 {
        self.builds.load(Ordering::SeqCst)
    }
}

impl BackendFactory for MockBackendFactory {
    fn build(&self) -> Result<Arc<dyn RetrievalBackend>, AgentError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if !self.build_delay.is_zero() {
            std::thread::sleep(self.build_delay);
        }
        match (&self.backend, &self.missing_path) {
            (Some(backend), _) => Ok(Arc::clone(backend) as Arc<dyn RetrievalBackend>),
            (None, path) => Err(AgentError::BackendUnavailable(format!(
                "RAG data not found at {}",
                path.as_deref().unwrap_or("<unset>")
            ))),
        }
    }
}
