use serde::{Deserialize, Serialize};

use crate::agent_message::Message;
use crate::roles::{AgentRole, RoutingDecision};

/// Execution statistics carried alongside the conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunMetadata {
    pub step: u32,
    pub tool_calls: u32,
    pub elapsed_ms: u64,
    /// Rough token count of all message content (chars / 4).
    pub token_estimate: u64,
}

/// The orchestrator-owned workflow state.
///
/// Messages are append-only. Agents never touch this directly; they return a
/// `StateUpdate` which is merged with `apply`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConversationState {
    pub messages: Vec<Message>,
    pub next: Option<RoutingDecision>,
    pub sender: Option<AgentRole>,
    pub metadata: RunMetadata,
}

/// A partial update returned by one agent step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    /// Appended in order.
    pub messages: Vec<Message>,
    /// Overwrites `ConversationState::next` when set.
    pub next: Option<RoutingDecision>,
    /// Overwrites `ConversationState::sender` when set.
    pub sender: Option<AgentRole>,
}

impl StateUpdate {
    pub fn message(message: Message) -> Self {
        Self {
            messages: vec![message],
            ..Self::default()
        }
    }

    pub fn with_sender(mut self, sender: AgentRole) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with_next(mut self, next: RoutingDecision) -> Self {
        self.next = Some(next);
        self
    }

    pub fn push(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }
}

impl ConversationState {
    pub fn new(query: impl Into<String>) -> Self {
        let mut state = Self::default();
        state.apply(StateUpdate::message(Message::user(query)));
        state
    }

    /// Merge an update: messages are appended, `next`/`sender` overwritten.
    pub fn apply(&mut self, update: StateUpdate) {
        for message in update.messages {
            self.metadata.token_estimate += estimate_tokens(&message.content);
            self.messages.push(message);
        }
        if let Some(next) = update.next {
            self.next = Some(next);
        }
        if let Some(sender) = update.sender {
            self.sender = Some(sender);
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Heuristic token count: one token per four characters.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() / 4) as u64
}
