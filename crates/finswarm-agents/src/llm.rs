use std::time::Duration;

use async_trait::async_trait;
use finswarm_models::{LlmConfig, Message, Role, ToolCallRecord};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::AgentError;
use crate::retry::RetryPolicy;

/// One model turn: free text plus any natively structured tool calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub text: String,
    pub tool_calls: Vec<ToolCallRecord>,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// Text-generating model. Mockable for testing.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn invoke(&self, messages: &[Message]) -> Result<ModelReply, AgentError>;
}

/// Configuration for a model CLI invocation.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub command: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self::from(&LlmConfig::default())
    }
}

impl From<&LlmConfig> for CliConfig {
    fn from(config: &LlmConfig) -> Self {
        Self {
            command: config.command.clone(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }
}

/// A `ChatModel` backed by a command-line client such as `claude`.
///
/// System messages become the system prompt; the rest of the conversation is
/// rendered as a plain transcript and passed with `-p`.
pub struct CliChatModel {
    config: CliConfig,
}

impl CliChatModel {
    pub fn new(config: CliConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ChatModel for CliChatModel {
    async fn invoke(&self, messages: &[Message]) -> Result<ModelReply, AgentError> {
        let (system_prompt, transcript) = render_conversation(messages);
        debug!(
            command = %self.config.command,
            model = %self.config.model,
            messages = messages.len(),
            "Invoking model CLI"
        );

        let output = tokio::time::timeout(self.config.timeout, async {
            Command::new(&self.config.command)
                .args([
                    "-p",
                    &transcript,
                    "--system-prompt",
                    &system_prompt,
                    "--model",
                    &self.config.model,
                    "--output-format",
                    "text",
                ])
                .kill_on_drop(true)
                .output()
                .await
        })
        .await
        .map_err(|_| AgentError::Timeout(self.config.timeout.as_secs()))?
        .map_err(|e| AgentError::Cli(format!("Failed to spawn {}: {e}", self.config.command)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, stderr = %stderr, "Model CLI failed");
            return Err(AgentError::Cli(format!(
                "{} exited {}: {}",
                self.config.command, output.status, stderr
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() {
            return Err(AgentError::Cli("Model returned empty response".to_string()));
        }

        Ok(ModelReply::text(stdout))
    }
}

/// Split a conversation into (system prompt, transcript).
pub fn render_conversation(messages: &[Message]) -> (String, String) {
    let mut system = Vec::new();
    let mut transcript = Vec::new();

    for message in messages {
        match message.role {
            Role::System => system.push(message.content.as_str()),
            Role::User => transcript.push(format!("User: {}", message.content)),
            Role::Assistant => {
                let speaker = message
                    .sender
                    .map(|s| s.label())
                    .unwrap_or("Assistant");
                transcript.push(format!("{speaker}: {}", message.content));
            }
            Role::Tool => transcript.push(format!("Tool result: {}", message.content)),
        }
    }

    (system.join("\n\n"), transcript.join("\n\n"))
}

/// Check if the model CLI is available on the system.
pub async fn check_cli_available(command: &str) -> bool {
    match Command::new(command).arg("--version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Wraps any `ChatModel` in a `RetryPolicy`.
pub struct RetryingModel<M> {
    inner: M,
    policy: RetryPolicy,
}

impl<M: ChatModel> RetryingModel<M> {
    pub fn new(inner: M, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<M: ChatModel> ChatModel for RetryingModel<M> {
    async fn invoke(&self, messages: &[Message]) -> Result<ModelReply, AgentError> {
        self.policy
            .run("model_invoke", || self.inner.invoke(messages))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedModel;
    use finswarm_models::AgentRole;

    #[test]
    fn default_config_follows_llm_defaults() {
        let config = CliConfig::default();
        assert_eq!(config.command, "claude");
        assert_eq!(config.model, "claude-3-5-haiku-latest");
        assert_eq!(config.timeout, Duration::from_secs(120));
    }

    #[test]
    fn render_splits_system_from_transcript() {
        let messages = vec![
            Message::system("You are the Supervisor."),
            Message::user("What was revenue in 2023?"),
            Message::assistant(AgentRole::Researcher, "Let me check."),
            Message::system("Respond with Next: <Role>."),
        ];
        let (system, transcript) = render_conversation(&messages);
        assert_eq!(
            system,
            "You are the Supervisor.\n\nRespond with Next: <Role>."
        );
        assert_eq!(
            transcript,
            "User: What was revenue in 2023?\n\nResearcher: Let me check."
        );
    }

    #[tokio::test]
    async fn missing_command_is_a_cli_error() {
        let model = CliChatModel::new(CliConfig {
            command: "finswarm-no-such-binary".to_string(),
            model: "m".to_string(),
            timeout: Duration::from_secs(5),
        });
        let result = model.invoke(&[Message::user("hi")]).await;
        assert!(matches!(result, Err(AgentError::Cli(_))));
        assert!(!check_cli_available("finswarm-no-such-binary").await);
    }

    #[tokio::test(start_paused = true)]
    async fn retrying_model_recovers_from_transient_failures() {
        let inner = ScriptedModel::new(["Next: FINISH"]).failing_first(2);
        let model = RetryingModel::new(inner, RetryPolicy::new(3, Duration::from_millis(10)));

        let reply = model.invoke(&[Message::user("q")]).await.unwrap();
        assert_eq!(reply.text, "Next: FINISH");
    }

    #[tokio::test(start_paused = true)]
    async fn retrying_model_gives_up_after_max_attempts() {
        let inner = ScriptedModel::new(["unused"]).failing_first(5);
        let model = RetryingModel::new(inner, RetryPolicy::new(2, Duration::from_millis(10)));

        assert!(model.invoke(&[Message::user("q")]).await.is_err());
    }
}
