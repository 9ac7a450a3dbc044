//! Append-only audit trail of agent actions.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::info;

/// Longest content preview kept in an audit entry.
const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub agent: String,
    pub action: String,
    pub content_preview: String,
}

impl AuditEntry {
    pub fn new(agent: impl Into<String>, action: impl Into<String>, content: impl AsRef<str>) -> Self {
        let content = content.as_ref();
        let content_preview = if content.chars().count() > PREVIEW_CHARS {
            let head: String = content.chars().take(PREVIEW_CHARS).collect();
            format!("{head}...")
        } else {
            content.to_string()
        };

        Self {
            agent: agent.into(),
            action: action.into(),
            content_preview,
        }
    }
}

/// Destination for audit entries. No read contract.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// Emits each entry as a structured `tracing` event on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: AuditEntry) {
        info!(
            target: "audit",
            agent = %entry.agent,
            action = %entry.action,
            content_preview = %entry.content_preview,
        );
    }
}

/// Keeps entries in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: AuditEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }
}
