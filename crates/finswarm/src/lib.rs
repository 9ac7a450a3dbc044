//! finswarm - multi-agent financial question answering
//!
//! A Supervisor agent routes each question between a Researcher (document
//! retrieval over financial reports) and a Quant (chart generation) until it
//! decides the answer is complete. Retrieval goes through a resilient adapter
//! with retries, timeouts and a durable query cache.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use finswarm::models::FinswarmConfig;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let swarm = finswarm::build_graph(&FinswarmConfig::default())?;
//! swarm.adapter.initialize().await?;
//! let report = swarm.graph.run("Compare NVIDIA's revenue growth from 2023 to 2024.").await?;
//! println!("{:?}", report.final_answer());
//! # Ok(())
//! # }
//! ```

pub use finswarm_agents as agents;
pub use finswarm_cache as cache;
pub use finswarm_models as models;

pub mod eval;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use finswarm_agents::llm::check_cli_available;
use finswarm_agents::{
    AgentGraph, AgentModels, AdapterOptions, ChatModel, CliChatModel, CliConfig,
    DataExportRenderer, DocumentIndexFactory, PlotTool, RagTool, ResilientQueryAdapter,
    RetryPolicy, RetryingModel, ToolRegistry, TracingAuditSink,
};
use finswarm_cache::{QueryCache, SqliteStore};
use finswarm_models::FinswarmConfig;
use serde::Serialize;
use tracing::{info, warn};

/// Load configuration from a TOML file. A missing file yields the defaults.
pub fn load_config(path: &str) -> Result<FinswarmConfig, anyhow::Error> {
    if !Path::new(path).exists() {
        warn!(path, "Config file not found, using defaults");
        return Ok(FinswarmConfig::default());
    }

    let raw =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config: {path}"))?;
    toml::from_str(&raw).with_context(|| format!("Failed to parse config: {path}"))
}

/// A wired agent graph plus the retrieval adapter it queries through.
///
/// The adapter is exposed so callers can force backend construction up front
/// with `initialize()`.
pub struct Swarm {
    pub graph: AgentGraph,
    pub adapter: Arc<ResilientQueryAdapter>,
}

/// Build the agent graph from configuration.
pub fn build_graph(config: &FinswarmConfig) -> Result<Swarm, anyhow::Error> {
    if let Some(parent) = Path::new(&config.cache.sqlite_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create cache directory: {}", parent.display())
            })?;
        }
    }
    let sqlite = SqliteStore::open(&config.cache.sqlite_path)
        .with_context(|| format!("Failed to open cache: {}", config.cache.sqlite_path))?;
    let cache = Arc::new(QueryCache::new(
        sqlite,
        config.cache.memory_max_capacity,
        Duration::from_secs(config.cache.memory_ttl_seconds),
    ));

    let model: Arc<dyn ChatModel> = Arc::new(RetryingModel::new(
        CliChatModel::new(CliConfig::from(&config.llm)),
        RetryPolicy::new(
            config.llm.max_attempts,
            Duration::from_millis(config.llm.backoff_base_ms),
        ),
    ));

    // The adapter's retry policy is the only retry layer around backend queries.
    let synthesis_model: Arc<dyn ChatModel> =
        Arc::new(CliChatModel::new(CliConfig::from(&config.llm)));
    let factory = Arc::new(DocumentIndexFactory::from_config(
        &config.rag,
        synthesis_model,
    ));
    let adapter = Arc::new(ResilientQueryAdapter::new(
        factory,
        cache,
        AdapterOptions::from(&config.rag),
    ));

    let tools = ToolRegistry::new()
        .register(Arc::new(RagTool::new(Arc::clone(&adapter))))
        .register(Arc::new(PlotTool::new(Arc::new(DataExportRenderer::new(
            &config.output.dir,
        )))));

    let graph = AgentGraph::new(
        AgentModels::shared(model),
        tools,
        Arc::new(TracingAuditSink),
        &config.graph,
    );

    info!(
        model = %config.llm.model,
        data_path = %config.rag.data_path,
        cache = %config.cache.sqlite_path,
        "Agent graph ready"
    );
    Ok(Swarm { graph, adapter })
}

/// Whether the runtime prerequisites are in place.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EnvironmentReport {
    pub cli_command: String,
    pub cli_available: bool,
    pub data_path: String,
    pub data_present: bool,
}

impl EnvironmentReport {
    pub fn is_ready(&self) -> bool {
        self.cli_available && self.data_present
    }
}

pub async fn check_environment(config: &FinswarmConfig) -> EnvironmentReport {
    EnvironmentReport {
        cli_command: config.llm.command.clone(),
        cli_available: check_cli_available(&config.llm.command).await,
        data_path: config.rag.data_path.clone(),
        data_present: Path::new(&config.rag.data_path).is_file(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finswarm_agents::{AdapterInitState, AgentError};

    fn temp_config(dir: &Path) -> FinswarmConfig {
        let mut config = FinswarmConfig::default();
        config.cache.sqlite_path = dir.join("cache/rag_cache.db").display().to_string();
        config.rag.data_path = dir.join("parsed.md").display().to_string();
        config.output.dir = dir.join("output").display().to_string();
        config.llm.command = "finswarm-test-missing-cli".to_string();
        config
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let config = load_config("/nonexistent/finswarm.toml").unwrap();
        assert_eq!(config, FinswarmConfig::default());
    }

    #[test]
    fn config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("finswarm.toml");
        std::fs::write(&path, "[graph]\nrecursion_limit = 7\n").unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.graph.recursion_limit, 7);
        assert_eq!(config.rag.top_k, 3);
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("finswarm.toml");
        std::fs::write(&path, "[graph\nrecursion_limit = ").unwrap();

        assert!(load_config(path.to_str().unwrap()).is_err());
    }

    #[tokio::test]
    async fn build_graph_creates_cache_and_defers_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(dir.path());

        let swarm = build_graph(&config).unwrap();
        assert!(dir.path().join("cache/rag_cache.db").exists());
        assert_eq!(swarm.adapter.init_state(), AdapterInitState::Uninitialized);

        let err = swarm.adapter.initialize().await.unwrap_err();
        assert!(matches!(err, AgentError::BackendUnavailable(_)));
        assert_eq!(swarm.adapter.init_state(), AdapterInitState::Failed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_backend_query_invokes_model_once_per_adapter_attempt() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let mut config = temp_config(dir.path());

        let log = dir.path().join("invocations.log");
        let script = dir.path().join("failing-cli.sh");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho call >> '{}'\nexit 1\n", log.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::fs::write(
            &config.rag.data_path,
            "# Results\n\nTotal revenue was 60,922 million in fiscal 2024.\n",
        )
        .unwrap();

        config.llm.command = script.display().to_string();
        config.llm.max_attempts = 3;
        config.llm.backoff_base_ms = 1;
        config.rag.max_attempts = 3;
        config.rag.backoff_base_ms = 1;

        let swarm = build_graph(&config).unwrap();
        let result = swarm.adapter.query("What was revenue?").await.unwrap();
        assert!(result.is_fallback());

        let invocations = std::fs::read_to_string(&log).unwrap().lines().count();
        assert_eq!(invocations, config.rag.max_attempts as usize);
    }

    #[tokio::test]
    async fn environment_report_flags_missing_pieces() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(dir.path());

        let report = check_environment(&config).await;
        assert!(!report.cli_available);
        assert!(!report.data_present);
        assert!(!report.is_ready());

        std::fs::write(&config.rag.data_path, "# Report\n").unwrap();
        let report = check_environment(&config).await;
        assert!(report.data_present);
    }
}
