pub mod audit;
pub mod error;
pub mod graph;
pub mod index;
pub mod llm;
pub mod parser;
pub mod prompts;
pub mod rag_adapter;
pub mod retry;
pub mod routing;
pub mod tool_call;
pub mod tools;
pub mod validation;

pub mod test_support;

pub use audit::{AuditEntry, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use error::AgentError;
pub use graph::{AgentGraph, AgentModels, RunOutcome, RunReport};
pub use index::DocumentIndexFactory;
pub use llm::{ChatModel, CliChatModel, CliConfig, ModelReply, RetryingModel};
pub use parser::parse_structured;
pub use rag_adapter::{
    AdapterInitState, AdapterOptions, BackendFactory, ResilientQueryAdapter, RetrievalBackend,
};
pub use retry::RetryPolicy;
pub use routing::RoutingPolicy;
pub use tool_call::{extract_tool_call, AgentOutput, ToolCallExtractor};
pub use tools::{DataExportRenderer, PlotTool, RagTool, ToolRegistry};
