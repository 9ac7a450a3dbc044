//! Maps free-form Supervisor output onto a valid `RoutingDecision`.
//!
//! Rules, first match wins:
//! 1. `<think>...</think>` blocks are removed before matching.
//! 2. `Next: <Role>` (case-insensitive) selects that role.
//! 3. A short reply (< `short_reply_chars`) containing `FINISH` anywhere,
//!    reasoning included, finishes.
//! 4. Otherwise the information-gathering worker runs next. An inconclusive
//!    reply never finishes the workflow.

use std::sync::LazyLock;

use finswarm_models::{RoutingDecision, WorkerRole, FINISH};
use regex::Regex;
use tracing::debug;

static REASONING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think>.*?</think>").expect("valid reasoning pattern"));

static NEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    let labels = RoutingDecision::labels()
        .into_iter()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)Next:\s*({labels})")).expect("valid routing pattern")
});

pub const DEFAULT_SHORT_REPLY_CHARS: usize = 50;

#[derive(Debug, Clone, Copy)]
pub struct RoutingPolicy {
    /// Replies shorter than this that mention `FINISH` are taken as a finish signal.
    pub short_reply_chars: usize,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            short_reply_chars: DEFAULT_SHORT_REPLY_CHARS,
        }
    }
}

impl RoutingPolicy {
    /// Decide the next step. Total: every input maps to a valid decision.
    pub fn route(&self, text: &str) -> RoutingDecision {
        let visible = strip_reasoning(text);

        if let Some(decision) = NEXT_RE
            .captures(&visible)
            .and_then(|caps| caps.get(1))
            .and_then(|m| RoutingDecision::from_label(m.as_str()))
        {
            debug!(decision = %decision, "Routed by Next: directive");
            return decision;
        }

        if text.chars().count() < self.short_reply_chars && text.to_uppercase().contains(FINISH) {
            debug!("Routed to FINISH by short-reply heuristic");
            return RoutingDecision::Finish;
        }

        let fallback = RoutingDecision::Worker(WorkerRole::information_gatherer());
        debug!(decision = %fallback, "Inconclusive supervisor output, using default route");
        fallback
    }
}

/// Remove every `<think>...</think>` block.
pub fn strip_reasoning(text: &str) -> String {
    REASONING_RE.replace_all(text, "").into_owned()
}
