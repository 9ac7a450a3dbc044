use finswarm_models::{RoutingDecision, WorkerRole, TOOL_PLOT, TOOL_RAG};

/// The exact textual directive a worker must emit to call `tool`.
fn tool_call_format(tool: &str) -> String {
    let args = match tool {
        TOOL_PLOT => serde_json::json!({
            "data_str": "...",
            "plot_type": "...",
            "title": "...",
            "xlabel": "...",
            "ylabel": "..."
        }),
        _ => serde_json::json!({"question": "..."}),
    };
    format!("TOOL_CALL: {tool}\nARGS: {args}")
}

pub fn supervisor_system_prompt() -> String {
    format!(
        "You are a Senior Financial Manager (Supervisor) overseeing a team of specialists:\n\
         1. {researcher}: Uses a structure-aware RAG to extract precise data from financial reports.\n\
         2. {quant}: Uses plotting tools to create data visualizations (charts/plots).\n\n\
         ## WORKFLOW RULES\n\n\
         - If a query requires data retrieval, delegate to '{researcher}' first.\n\
         - If data is available but needs visualization, delegate to '{quant}'.\n\
         - After a specialist reports back, audit their output. If the task is complete, \
         route to '{finish}'.\n\n\
         ## RESPONSE FORMAT\n\n\
         You must output a single line at the end: 'Next: <Role>'\n\
         Where <Role> is one of: {options}\n",
        researcher = WorkerRole::Researcher.label(),
        quant = WorkerRole::Quant.label(),
        finish = RoutingDecision::Finish.label(),
        options = route_options(),
    )
}

/// Appended after the conversation on every Supervisor turn.
pub fn routing_instruction() -> String {
    format!(
        "Based on the conversation, who should act next? \
         Respond with 'Next: <Role>' where <Role> is one of [{}].",
        route_options()
    )
}

fn route_options() -> String {
    RoutingDecision::labels().join(", ")
}

pub fn researcher_system_prompt() -> String {
    format!(
        "You are a Researcher. You have access to a tool: {TOOL_RAG}.\n\
         Use it to find financial data.\n\
         To call the tool, you MUST use this exact format:\n\
         {}\n\n\
         If you have the data, just answer.",
        tool_call_format(TOOL_RAG)
    )
}

pub fn quant_system_prompt() -> String {
    format!(
        "You are a Quant Analyst. You have access to a tool: {TOOL_PLOT}.\n\
         Use it to visualize data. `data_str` must be a JSON list of objects, one per data point.\n\
         To call the tool, you MUST use this exact format:\n\
         {}\n\n\
         If the plot is created, just say 'Chart created'.",
        tool_call_format(TOOL_PLOT)
    )
}

pub fn worker_system_prompt(worker: WorkerRole) -> String {
    match worker {
        WorkerRole::Researcher => researcher_system_prompt(),
        WorkerRole::Quant => quant_system_prompt(),
    }
}

/// System message sent back to a worker whose tool arguments could not be parsed.
pub fn corrective_message(tool: &str, error: &str) -> String {
    format!(
        "Your call to {tool} could not be executed: {error}\n\
         Retry with valid syntax. The arguments must be a single JSON object:\n\
         {}",
        tool_call_format(tool)
    )
}
