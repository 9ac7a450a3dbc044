use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel label the Supervisor uses to end the workflow.
pub const FINISH: &str = "FINISH";

/// Tool name the Researcher may call.
pub const TOOL_RAG: &str = "query_financial_rag";
/// Tool name the Quant may call.
pub const TOOL_PLOT: &str = "create_plot";

/// Every model-driven participant in the graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AgentRole {
    Supervisor,
    Researcher,
    Quant,
}

impl AgentRole {
    pub fn label(&self) -> &'static str {
        match self {
            AgentRole::Supervisor => "Supervisor",
            AgentRole::Researcher => "Researcher",
            AgentRole::Quant => "Quant",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Non-Supervisor agents. Only workers may invoke tools.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum WorkerRole {
    Researcher,
    Quant,
}

impl WorkerRole {
    pub const ALL: [WorkerRole; 2] = [WorkerRole::Researcher, WorkerRole::Quant];

    /// The worker that gathers information. Inconclusive routing falls back here.
    pub const fn information_gatherer() -> Self {
        WorkerRole::Researcher
    }

    pub fn label(&self) -> &'static str {
        self.as_agent().label()
    }

    pub fn as_agent(&self) -> AgentRole {
        match self {
            WorkerRole::Researcher => AgentRole::Researcher,
            WorkerRole::Quant => AgentRole::Quant,
        }
    }

    /// Tools this worker is permitted to call.
    pub fn tool_whitelist(&self) -> &'static [&'static str] {
        match self {
            WorkerRole::Researcher => &[TOOL_RAG],
            WorkerRole::Quant => &[TOOL_PLOT],
        }
    }

    /// Case-insensitive lookup by label.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|w| w.label().eq_ignore_ascii_case(label.trim()))
    }
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The Supervisor's choice of next step.
///
/// Only `FINISH` or a worker can be represented, so an out-of-set label
/// cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum RoutingDecision {
    Finish,
    Worker(WorkerRole),
}

impl RoutingDecision {
    /// Canonical label: `FINISH` verbatim or the title-cased worker name.
    pub fn label(&self) -> &'static str {
        match self {
            RoutingDecision::Finish => FINISH,
            RoutingDecision::Worker(w) => w.label(),
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        if label.trim().eq_ignore_ascii_case(FINISH) {
            return Some(RoutingDecision::Finish);
        }
        WorkerRole::from_label(label).map(RoutingDecision::Worker)
    }

    /// All valid labels, finish sentinel first.
    pub fn labels() -> Vec<&'static str> {
        std::iter::once(FINISH)
            .chain(WorkerRole::ALL.iter().map(|w| w.label()))
            .collect()
    }
}

impl fmt::Display for RoutingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<RoutingDecision> for String {
    fn from(decision: RoutingDecision) -> Self {
        decision.label().to_string()
    }
}

impl TryFrom<String> for RoutingDecision {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_label(&value).ok_or_else(|| format!("unknown routing label: {value}"))
    }
}
