//! The Supervisor → worker → tools → worker → Supervisor loop.
//!
//! Each node returns a `StateUpdate` which the graph merges into the
//! `ConversationState` it owns. The Supervisor's reply goes through
//! `RoutingPolicy`; a worker's reply goes through `ToolCallExtractor`. A
//! malformed tool payload sends the worker a corrective system message and
//! hands it the turn again. Every node execution counts against
//! `recursion_limit`.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use finswarm_models::{
    AgentRole, ConversationState, GraphConfig, Message, RoutingDecision, StateUpdate,
    ToolCallRecord, WorkerRole,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::audit::{AuditEntry, AuditSink};
use crate::error::AgentError;
use crate::llm::ChatModel;
use crate::prompts::{
    corrective_message, routing_instruction, supervisor_system_prompt, worker_system_prompt,
};
use crate::routing::RoutingPolicy;
use crate::tool_call::{AgentOutput, ToolCallExtractor};
use crate::tools::ToolRegistry;
use crate::validation::sanitize_input;

/// One model per agent role. They may all be the same instance.
#[derive(Clone)]
pub struct AgentModels {
    pub supervisor: Arc<dyn ChatModel>,
    pub researcher: Arc<dyn ChatModel>,
    pub quant: Arc<dyn ChatModel>,
}

impl AgentModels {
    pub fn shared(model: Arc<dyn ChatModel>) -> Self {
        Self {
            supervisor: Arc::clone(&model),
            researcher: Arc::clone(&model),
            quant: model,
        }
    }

    fn worker(&self, worker: WorkerRole) -> &Arc<dyn ChatModel> {
        match worker {
            WorkerRole::Researcher => &self.researcher,
            WorkerRole::Quant => &self.quant,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// The Supervisor routed to FINISH.
    Finished,
    /// `recursion_limit` node executions ran without a FINISH.
    StepLimit,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    pub steps: u32,
    pub elapsed_ms: u64,
    pub state: ConversationState,
}

impl RunReport {
    /// The last worker answer, if any worker spoke.
    pub fn final_answer(&self) -> Option<&str> {
        self.state
            .messages
            .iter()
            .rev()
            .find(|m| matches!(m.sender, Some(AgentRole::Researcher | AgentRole::Quant)))
            .map(|m| m.content.as_str())
    }
}

enum Node {
    Supervisor,
    Worker(WorkerRole),
    Tools {
        call: ToolCallRecord,
        sender: WorkerRole,
    },
}

impl Node {
    fn label(&self) -> &'static str {
        match self {
            Node::Supervisor => AgentRole::Supervisor.label(),
            Node::Worker(worker) => worker.label(),
            Node::Tools { .. } => "tools",
        }
    }
}

pub struct AgentGraph {
    models: AgentModels,
    tools: ToolRegistry,
    extractor: ToolCallExtractor,
    routing: RoutingPolicy,
    audit: Arc<dyn AuditSink>,
    recursion_limit: u32,
    max_query_chars: usize,
}

impl AgentGraph {
    pub fn new(
        models: AgentModels,
        tools: ToolRegistry,
        audit: Arc<dyn AuditSink>,
        config: &GraphConfig,
    ) -> Self {
        Self {
            models,
            tools,
            extractor: ToolCallExtractor::new(Arc::clone(&audit)),
            routing: RoutingPolicy::default(),
            audit,
            recursion_limit: config.recursion_limit,
            max_query_chars: config.max_query_chars,
        }
    }

    /// Run the workflow for one user query until FINISH or the step limit.
    ///
    /// Routing and tool-call problems are folded into the conversation. Model
    /// errors that survive the model's own retries end the run.
    pub async fn run(&self, query: &str) -> Result<RunReport, AgentError> {
        let query = sanitize_input(query, self.max_query_chars);
        if query.is_empty() {
            return Err(AgentError::Validation("query is empty".to_string()));
        }

        let started_at = Utc::now();
        let start = Instant::now();
        info!(query = %query, recursion_limit = self.recursion_limit, "Starting run");

        let mut state = ConversationState::new(query);
        let mut node = Node::Supervisor;

        let outcome = loop {
            if state.metadata.step >= self.recursion_limit {
                warn!(steps = state.metadata.step, "Step limit reached without FINISH");
                break RunOutcome::StepLimit;
            }
            state.metadata.step += 1;
            let agent = node.label();

            node = match node {
                Node::Supervisor => {
                    let update = self.supervisor_step(&state).await?;
                    let decision = update.next.unwrap_or(RoutingDecision::Finish);
                    state.apply(update);
                    match decision {
                        RoutingDecision::Finish => {
                            self.record_step(&mut state, agent, start);
                            break RunOutcome::Finished;
                        }
                        RoutingDecision::Worker(worker) => Node::Worker(worker),
                    }
                }
                Node::Worker(worker) => {
                    let (update, output) = self.worker_step(worker, &state).await?;
                    state.apply(update);
                    match output {
                        AgentOutput::ToolInvocation { call, .. } => Node::Tools {
                            call,
                            sender: worker,
                        },
                        AgentOutput::MalformedToolCall { .. } => Node::Worker(worker),
                        AgentOutput::PlainAnswer(_) => Node::Supervisor,
                    }
                }
                Node::Tools { call, sender } => {
                    let update = self.tool_step(&call, sender).await;
                    state.metadata.tool_calls += 1;
                    state.apply(update);
                    Node::Worker(sender)
                }
            };

            self.record_step(&mut state, agent, start);
        };

        let report = RunReport {
            started_at,
            outcome,
            steps: state.metadata.step,
            elapsed_ms: start.elapsed().as_millis() as u64,
            state,
        };
        info!(
            outcome = ?report.outcome,
            steps = report.steps,
            tool_calls = report.state.metadata.tool_calls,
            elapsed_ms = report.elapsed_ms,
            "Run complete"
        );
        Ok(report)
    }

    fn record_step(&self, state: &mut ConversationState, agent: &str, start: Instant) {
        state.metadata.elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            step = state.metadata.step,
            agent,
            tokens = state.metadata.token_estimate,
            "Step complete"
        );
    }

    /// Ask the Supervisor who acts next. Never fails on odd output.
    pub async fn supervisor_step(
        &self,
        state: &ConversationState,
    ) -> Result<StateUpdate, AgentError> {
        let mut messages = Vec::with_capacity(state.messages.len() + 2);
        messages.push(Message::system(supervisor_system_prompt()));
        messages.extend(state.messages.iter().cloned());
        messages.push(Message::system(routing_instruction()));

        let reply = self.models.supervisor.invoke(&messages).await?;
        self.audit.record(AuditEntry::new(
            AgentRole::Supervisor.label(),
            "Thought",
            &reply.text,
        ));

        let decision = self.routing.route(&reply.text);
        info!(next = %decision, "Supervisor routed");

        Ok(StateUpdate::default()
            .with_sender(AgentRole::Supervisor)
            .with_next(decision))
    }

    /// One worker turn, classified into an `AgentOutput`.
    pub async fn worker_step(
        &self,
        worker: WorkerRole,
        state: &ConversationState,
    ) -> Result<(StateUpdate, AgentOutput), AgentError> {
        let agent = worker.as_agent();

        let mut messages = Vec::with_capacity(state.messages.len() + 1);
        messages.push(Message::system(worker_system_prompt(worker)));
        messages.extend(state.messages.iter().cloned());

        let reply = self.models.worker(worker).invoke(&messages).await?;
        let output = self
            .extractor
            .classify(reply, worker.tool_whitelist(), agent);

        let message = Message::assistant(agent, output.text());
        let update = match &output {
            AgentOutput::ToolInvocation { call, .. } => {
                StateUpdate::message(message.with_tool_call(call.clone()))
            }
            AgentOutput::MalformedToolCall { tool, error, .. } => {
                warn!(agent = %agent, tool = %tool, error = %error, "Malformed tool call, asking for a retry");
                StateUpdate::message(message).push(Message::system(corrective_message(tool, error)))
            }
            AgentOutput::PlainAnswer(_) => StateUpdate::message(message),
        };

        Ok((update.with_sender(agent), output))
    }

    async fn tool_step(&self, call: &ToolCallRecord, sender: WorkerRole) -> StateUpdate {
        let started = Instant::now();
        let output = self.tools.execute(call).await;
        info!(
            tool = %call.name,
            caller = %sender,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Tool executed"
        );
        self.audit.record(AuditEntry::new(sender.label(), "ToolResult", &output));
        StateUpdate::message(Message::tool_result(call, output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::test_support::ScriptedModel;
    use finswarm_models::Role;

    fn graph(models: AgentModels, recursion_limit: u32) -> (AgentGraph, Arc<MemoryAuditSink>) {
        let audit = Arc::new(MemoryAuditSink::default());
        let config = GraphConfig {
            recursion_limit,
            ..GraphConfig::default()
        };
        (
            AgentGraph::new(models, ToolRegistry::new(), audit.clone(), &config),
            audit,
        )
    }

    fn scripted(supervisor: &[&str], researcher: &[&str], quant: &[&str]) -> AgentModels {
        AgentModels {
            supervisor: Arc::new(ScriptedModel::new(supervisor.iter().copied())),
            researcher: Arc::new(ScriptedModel::new(researcher.iter().copied())),
            quant: Arc::new(ScriptedModel::new(quant.iter().copied())),
        }
    }

    #[tokio::test]
    async fn immediate_finish_takes_one_step() {
        let (graph, audit) = graph(scripted(&["Next: FINISH"], &[], &[]), 20);
        let report = graph.run("Hello").await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Finished);
        assert_eq!(report.steps, 1);
        assert_eq!(report.state.messages.len(), 1);
        assert_eq!(report.final_answer(), None);
        assert_eq!(audit.entries()[0].action, "Thought");
    }

    #[tokio::test]
    async fn plain_answer_returns_to_supervisor() {
        let (graph, _) = graph(
            scripted(
                &["Next: Researcher", "Next: FINISH"],
                &["Revenue was $26.97B in FY2023."],
                &[],
            ),
            20,
        );
        let report = graph.run("What was revenue in 2023?").await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Finished);
        assert_eq!(report.steps, 3);
        assert_eq!(report.final_answer(), Some("Revenue was $26.97B in FY2023."));
        assert_eq!(report.state.sender, Some(AgentRole::Supervisor));
        assert_eq!(report.state.next, Some(RoutingDecision::Finish));
    }

    #[tokio::test]
    async fn step_limit_ends_the_run_without_error() {
        let supervisor: Vec<&str> = vec!["thinking..."; 10];
        let researcher: Vec<&str> = vec!["still looking"; 10];
        let (graph, _) = graph(scripted(&supervisor, &researcher, &[]), 5);

        let report = graph.run("q").await.unwrap();
        assert_eq!(report.outcome, RunOutcome::StepLimit);
        assert_eq!(report.steps, 5);
    }

    #[tokio::test]
    async fn model_failure_ends_the_run() {
        let (graph, _) = graph(scripted(&[], &[], &[]), 20);
        assert!(matches!(graph.run("q").await, Err(AgentError::Cli(_))));
    }

    #[tokio::test]
    async fn query_is_sanitized_before_the_first_step() {
        let supervisor = Arc::new(ScriptedModel::new(["FINISH"]));
        let models = AgentModels {
            supervisor: supervisor.clone(),
            ..scripted(&[], &[], &[])
        };
        let (graph, _) = graph(models, 20);

        graph.run("  revenue\u{7}  2023 €  ").await.unwrap();
        let first = &supervisor.transcripts()[0];
        assert_eq!(first[1].role, Role::User);
        assert_eq!(first[1].content, "revenue  2023 ");

        assert!(matches!(
            graph.run("   ").await,
            Err(AgentError::Validation(_))
        ));
    }
}
