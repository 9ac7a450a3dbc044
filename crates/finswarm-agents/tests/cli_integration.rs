//! Integration tests that invoke the real model CLI.
//!
//! These tests are `#[ignore]` by default. They require:
//! - The `claude` CLI installed and on PATH
//! - Valid credentials configured
//!
//! Run explicitly with:
//! ```bash
//! cargo test -p finswarm-agents --test cli_integration -- --ignored
//! ```

use std::time::Duration;

use finswarm_agents::llm::check_cli_available;
use finswarm_agents::{
    extract_tool_call, ChatModel, CliChatModel, CliConfig, RoutingPolicy,
};
use finswarm_models::{Message, RoutingDecision, WorkerRole};

fn config() -> CliConfig {
    CliConfig {
        timeout: Duration::from_secs(60),
        ..CliConfig::default()
    }
}

#[tokio::test]
#[ignore]
async fn cli_is_available() {
    assert!(
        check_cli_available(&config().command).await,
        "model CLI not found on PATH"
    );
}

/// The Supervisor prompt must produce something the routing policy accepts.
#[tokio::test]
#[ignore]
async fn supervisor_reply_routes() {
    if !check_cli_available(&config().command).await {
        eprintln!("Skipping: model CLI not available");
        return;
    }

    let model = CliChatModel::new(config());
    let messages = [
        Message::system(finswarm_agents::prompts::supervisor_system_prompt()),
        Message::user("What was NVIDIA's revenue in fiscal 2024?"),
        Message::system(finswarm_agents::prompts::routing_instruction()),
    ];
    let reply = model.invoke(&messages).await.expect("model invocation failed");

    let decision = RoutingPolicy::default().route(&reply.text);
    assert_eq!(
        decision,
        RoutingDecision::Worker(WorkerRole::Researcher),
        "Unexpected routing for reply:\n---\n{}\n---",
        reply.text
    );
}

/// The Researcher prompt must produce an extractable tool call.
#[tokio::test]
#[ignore]
async fn researcher_reply_contains_tool_call() {
    if !check_cli_available(&config().command).await {
        eprintln!("Skipping: model CLI not available");
        return;
    }

    let model = CliChatModel::new(config());
    let messages = [
        Message::system(finswarm_agents::prompts::researcher_system_prompt()),
        Message::user("What was NVIDIA's revenue in fiscal 2024?"),
    ];
    let reply = model.invoke(&messages).await.expect("model invocation failed");

    let call = extract_tool_call(&reply.text, WorkerRole::Researcher.tool_whitelist())
        .unwrap_or_else(|e| panic!("Malformed tool call ({e}) in:\n{}", reply.text));
    assert!(call.is_some(), "No tool call in:\n{}", reply.text);
}
