use std::sync::{Arc, LazyLock};

use finswarm_models::{AgentRole, ToolCallRecord};
use regex::Regex;
use tracing::debug;

use crate::audit::{AuditEntry, AuditSink};
use crate::error::AgentError;
use crate::llm::ModelReply;
use crate::parser::{balanced_object_end, parse_object};

/// `TOOL_CALL: <name>` followed by `ARGS:`. The payload itself is located by
/// brace scanning, not by the regex.
static TOOL_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)TOOL_CALL:\s*([A-Za-z0-9_.\-]+)\s*ARGS:").expect("valid tool-call pattern")
});

/// What a worker's turn amounts to, decided once and consumed by the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutput {
    /// No tool directive: the text is an answer.
    PlainAnswer(String),
    ToolInvocation { text: String, call: ToolCallRecord },
    /// A whitelisted tool was named but its arguments could not be parsed.
    MalformedToolCall {
        text: String,
        tool: String,
        error: String,
    },
}

impl AgentOutput {
    pub fn text(&self) -> &str {
        match self {
            AgentOutput::PlainAnswer(text)
            | AgentOutput::ToolInvocation { text, .. }
            | AgentOutput::MalformedToolCall { text, .. } => text,
        }
    }
}

/// Internal outcome that keeps the tool name on failure.
enum Extraction {
    Found(ToolCallRecord),
    Malformed { tool: String, error: AgentError },
    Rejected(Vec<String>),
    Absent,
}

/// Find a `TOOL_CALL:`/`ARGS:` directive naming a whitelisted tool.
///
/// `Ok(None)` means no directive was found, which is a normal outcome.
/// Names are matched case-insensitively and the record carries the
/// whitelist's spelling.
pub fn extract_tool_call(
    text: &str,
    whitelist: &[&str],
) -> Result<Option<ToolCallRecord>, AgentError> {
    match scan(text, whitelist) {
        Extraction::Found(call) => Ok(Some(call)),
        Extraction::Malformed { error, .. } => Err(error),
        Extraction::Rejected(_) | Extraction::Absent => Ok(None),
    }
}

fn scan(text: &str, whitelist: &[&str]) -> Extraction {
    let mut rejected = Vec::new();

    for caps in TOOL_CALL_RE.captures_iter(text) {
        let (Some(name), Some(directive)) = (caps.get(1), caps.get(0)) else {
            continue;
        };

        let Some(canonical) = whitelist
            .iter()
            .find(|allowed| allowed.eq_ignore_ascii_case(name.as_str()))
        else {
            rejected.push(name.as_str().to_string());
            continue;
        };

        let Some(payload) = payload_after(text, directive.end()) else {
            continue;
        };

        return match parse_object(payload) {
            Ok(args) => Extraction::Found(ToolCallRecord::new(*canonical, args)),
            Err(error) => Extraction::Malformed {
                tool: canonical.to_string(),
                error,
            },
        };
    }

    if rejected.is_empty() {
        Extraction::Absent
    } else {
        Extraction::Rejected(rejected)
    }
}

/// The object region directly following `ARGS:`: the `{` after optional
/// whitespace through its balanced close, or through the first `}` when the
/// braces never balance.
fn payload_after(text: &str, from: usize) -> Option<&str> {
    let rest = &text[from..];
    let start = from + (rest.len() - rest.trim_start().len());
    if !text[start..].starts_with('{') {
        return None;
    }
    let end = balanced_object_end(text, start).or_else(|| {
        text[start..].find('}').map(|offset| start + offset)
    })?;
    Some(&text[start..=end])
}

/// Turns raw model replies into `AgentOutput`, auditing every attempt.
pub struct ToolCallExtractor {
    audit: Arc<dyn AuditSink>,
}

impl ToolCallExtractor {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self { audit }
    }

    /// Classify free text from `agent`.
    pub fn extract(&self, text: &str, whitelist: &[&str], agent: AgentRole) -> AgentOutput {
        match scan(text, whitelist) {
            Extraction::Found(call) => {
                self.audit.record(AuditEntry::new(
                    agent.label(),
                    "ToolCall",
                    format!("{} {}", call.name, serde_json::Value::Object(call.args.clone())),
                ));
                AgentOutput::ToolInvocation {
                    text: text.to_string(),
                    call,
                }
            }
            Extraction::Malformed { tool, error } => {
                self.audit.record(AuditEntry::new(
                    agent.label(),
                    "Error",
                    format!("Failed to parse tool args for {tool}: {error}"),
                ));
                AgentOutput::MalformedToolCall {
                    text: text.to_string(),
                    tool,
                    error: error.to_string(),
                }
            }
            Extraction::Rejected(names) => {
                self.audit.record(AuditEntry::new(
                    agent.label(),
                    "RejectedTool",
                    format!("Not permitted: {}", names.join(", ")),
                ));
                AgentOutput::PlainAnswer(text.to_string())
            }
            Extraction::Absent => {
                debug!(agent = %agent, "No tool call in output");
                AgentOutput::PlainAnswer(text.to_string())
            }
        }
    }

    /// Classify a model reply. Native tool calls win over textual directives
    /// but are held to the same whitelist.
    pub fn classify(&self, reply: ModelReply, whitelist: &[&str], agent: AgentRole) -> AgentOutput {
        let native = reply.tool_calls.into_iter().find_map(|call| {
            whitelist
                .iter()
                .find(|allowed| allowed.eq_ignore_ascii_case(&call.name))
                .map(|canonical| ToolCallRecord {
                    name: canonical.to_string(),
                    ..call
                })
        });

        match native {
            Some(call) => {
                self.audit.record(AuditEntry::new(
                    agent.label(),
                    "ToolCall",
                    format!("{} (native)", call.name),
                ));
                AgentOutput::ToolInvocation {
                    text: reply.text,
                    call,
                }
            }
            None => self.extract(&reply.text, whitelist, agent),
        }
    }
}
