pub mod agent_message;
pub mod cache_schema;
pub mod config;
pub mod query;
pub mod roles;
pub mod state;

pub use agent_message::{Message, Role, ToolCallRecord};
pub use cache_schema::CacheRow;
pub use config::{CacheConfig, FinswarmConfig, GraphConfig, LlmConfig, OutputConfig, RagConfig};
pub use query::{CacheEntry, QueryResult, FALLBACK_PREFIX};
pub use roles::{AgentRole, RoutingDecision, WorkerRole, FINISH, TOOL_PLOT, TOOL_RAG};
pub use state::{estimate_tokens, ConversationState, RunMetadata, StateUpdate};
