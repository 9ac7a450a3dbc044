use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use finswarm_models::{QueryResult, ToolCallRecord, TOOL_PLOT, TOOL_RAG};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::AgentError;
use crate::rag_adapter::ResilientQueryAdapter;
use crate::validation::validate_plot_data;

type Args = Map<String, Value>;

/// An external capability a worker can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, args: &Args) -> Result<String, AgentError>;
}

/// Dispatches tool calls by name. Failures come back as `Error: ...` text.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub async fn execute(&self, call: &ToolCallRecord) -> String {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, "Unknown tool");
            return format!("Error: unknown tool {}", call.name);
        };

        match tool.execute(&call.args).await {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool failed");
                format!("Error: {e}")
            }
        }
    }
}

fn string_arg<'a>(args: &'a Args, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

/// `query_financial_rag`: answers from the financial reports, with citations.
pub struct RagTool {
    adapter: Arc<ResilientQueryAdapter>,
}

impl RagTool {
    pub fn new(adapter: Arc<ResilientQueryAdapter>) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl Tool for RagTool {
    fn name(&self) -> &str {
        TOOL_RAG
    }

    async fn execute(&self, args: &Args) -> Result<String, AgentError> {
        let question = string_arg(args, "question")
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| AgentError::Validation("missing 'question' argument".to_string()))?;

        let result = self.adapter.query(question).await?;
        Ok(render_with_citations(&result))
    }
}

/// The answer followed by a `**Citations**` block, one line per source.
pub fn render_with_citations(result: &QueryResult) -> String {
    if result.is_fallback() || result.sources.is_empty() {
        return result.answer.clone();
    }

    let citations = result
        .sources
        .iter()
        .enumerate()
        .map(|(i, source)| format!("[Source {}]: Content: {source}...", i + 1))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{}\n\n**Citations**:\n{citations}", result.answer)
}

/// A validated chart request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChartSpec {
    pub plot_type: String,
    pub title: String,
    pub xlabel: String,
    pub ylabel: String,
    pub rows: Vec<Args>,
}

/// Turns a chart request into files on disk.
#[async_trait]
pub trait ChartRenderer: Send + Sync {
    async fn render(&self, spec: &ChartSpec) -> Result<Vec<PathBuf>, AgentError>;
}

/// `create_plot`: validates its data before handing it to a `ChartRenderer`.
pub struct PlotTool {
    renderer: Arc<dyn ChartRenderer>,
}

impl PlotTool {
    pub fn new(renderer: Arc<dyn ChartRenderer>) -> Self {
        Self { renderer }
    }
}

#[async_trait]
impl Tool for PlotTool {
    fn name(&self) -> &str {
        TOOL_PLOT
    }

    async fn execute(&self, args: &Args) -> Result<String, AgentError> {
        let data_str = match args.get("data_str") {
            Some(Value::String(s)) => s.clone(),
            // Models often inline the list instead of quoting it.
            Some(value @ Value::Array(_)) => value.to_string(),
            _ => {
                return Err(AgentError::Validation(
                    "missing 'data_str' argument".to_string(),
                ))
            }
        };
        let rows = validate_plot_data(&data_str)?;

        let spec = ChartSpec {
            plot_type: string_arg(args, "plot_type").unwrap_or("bar").to_string(),
            title: string_arg(args, "title").unwrap_or("chart").to_string(),
            xlabel: string_arg(args, "xlabel").unwrap_or_default().to_string(),
            ylabel: string_arg(args, "ylabel").unwrap_or_default().to_string(),
            rows,
        };
        info!(plot_type = %spec.plot_type, title = %spec.title, rows = spec.rows.len(), "Generating chart");

        let paths = self.renderer.render(&spec).await?;
        let listed = paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!("Chart generated: {listed}"))
    }
}

/// Writes the chart's data as CSV and its specification as JSON.
pub struct DataExportRenderer {
    output_dir: PathBuf,
}

impl DataExportRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl ChartRenderer for DataExportRenderer {
    async fn render(&self, spec: &ChartSpec) -> Result<Vec<PathBuf>, AgentError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let stem = safe_file_stem(&spec.title);
        let spec_path = self.output_dir.join(format!("{stem}.json"));
        let csv_path = self.output_dir.join(format!("{stem}.csv"));

        tokio::fs::write(&spec_path, serde_json::to_string_pretty(spec)?).await?;
        tokio::fs::write(&csv_path, rows_to_csv(&spec.rows)).await?;

        Ok(vec![spec_path, csv_path])
    }
}

/// Non-alphanumerics become `_`, then lowercase.
pub fn safe_file_stem(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .to_lowercase()
}

/// Columns in first-seen order across all rows; missing cells stay empty.
fn rows_to_csv(rows: &[Args]) -> String {
    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }

    let mut out = columns
        .iter()
        .map(|c| csv_field(c))
        .collect::<Vec<_>>()
        .join(",");
    out.push('\n');

    for row in rows {
        let line = columns
            .iter()
            .map(|c| match row.get(*c) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => csv_field(s),
                Some(other) => csv_field(&other.to_string()),
            })
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Args {
        match value {
            Value::Object(map) => map,
            _ => panic!("args must be an object"),
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        async fn execute(&self, args: &Args) -> Result<String, AgentError> {
            string_arg(args, "text")
                .map(str::to_string)
                .ok_or_else(|| AgentError::Tool("nothing to echo".to_string()))
        }
    }

    #[tokio::test]
    async fn registry_dispatches_and_reports_errors_as_text() {
        let registry = ToolRegistry::new().register(Arc::new(EchoTool));
        assert_eq!(registry.names(), vec!["echo"]);

        let ok = ToolCallRecord::new("echo", args(json!({"text": "hi"})));
        assert_eq!(registry.execute(&ok).await, "hi");

        let bad = ToolCallRecord::new("echo", Args::new());
        assert_eq!(registry.execute(&bad).await, "Error: Tool error: nothing to echo");

        let unknown = ToolCallRecord::new("rm_rf", Args::new());
        assert_eq!(registry.execute(&unknown).await, "Error: unknown tool rm_rf");
    }

    #[test]
    fn citations_follow_the_answer() {
        let result = QueryResult {
            answer: "Revenue was $60.9B.".to_string(),
            sources: vec!["| Revenue | 26,974 |".to_string(), "Total".to_string()],
            latency_s: 1.2,
            fallback: false,
        };
        assert_eq!(
            render_with_citations(&result),
            "Revenue was $60.9B.\n\n**Citations**:\n[Source 1]: Content: | Revenue | 26,974 |...\n[Source 2]: Content: Total..."
        );
    }

    #[test]
    fn fallback_is_rendered_without_citations() {
        let result = QueryResult::fallback("RAG engine connection failed: timeout");
        assert_eq!(
            render_with_citations(&result),
            "Error: RAG engine connection failed: timeout"
        );
    }

    #[test]
    fn file_stem_is_sanitized() {
        assert_eq!(safe_file_stem("NVIDIA Revenue 2023-2024"), "nvidia_revenue_2023_2024");
    }

    #[test]
    fn csv_unions_columns_and_quotes_fields() {
        let rows = vec![
            args(json!({"label": "FY2023", "value": 26.97})),
            args(json!({"label": "FY, 2024", "note": "say \"hi\""})),
        ];
        assert_eq!(
            rows_to_csv(&rows),
            "label,value,note\nFY2023,26.97,\n\"FY, 2024\",,\"say \"\"hi\"\"\"\n"
        );
    }

    #[tokio::test]
    async fn plot_tool_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let tool = PlotTool::new(Arc::new(DataExportRenderer::new(dir.path().join("out"))));

        let output = tool
            .execute(&args(json!({
                "data_str": "[{\"label\": \"FY2023\", \"value\": 26.97}, {\"label\": \"FY2024\", \"value\": 60.92}]",
                "plot_type": "bar",
                "title": "NVIDIA Revenue",
                "xlabel": "Fiscal year",
                "ylabel": "USD bn"
            })))
            .await
            .unwrap();

        assert!(output.starts_with("Chart generated: "));
        let csv = std::fs::read_to_string(dir.path().join("out/nvidia_revenue.csv")).unwrap();
        assert_eq!(csv, "label,value\nFY2023,26.97\nFY2024,60.92\n");

        let spec: Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("out/nvidia_revenue.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(spec["plot_type"], "bar");
        assert_eq!(spec["rows"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn plot_tool_accepts_inline_array() {
        let dir = tempfile::tempdir().unwrap();
        let tool = PlotTool::new(Arc::new(DataExportRenderer::new(dir.path())));

        let output = tool
            .execute(&args(json!({
                "data_str": [{"year": 2023, "value": 1}, {"year": 2024, "value": 2}],
                "title": "Inline"
            })))
            .await
            .unwrap();
        assert!(output.contains("inline.csv"));
    }

    #[tokio::test]
    async fn plot_tool_validates_before_rendering() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("never");
        let tool = PlotTool::new(Arc::new(DataExportRenderer::new(&out)));

        for bad in [json!({}), json!({"data_str": "[]"}), json!({"data_str": "{\"a\": 1, \"b\": 2}"})] {
            let result = tool.execute(&args(bad)).await;
            assert!(matches!(result, Err(AgentError::Validation(_))));
        }
        assert!(!out.exists());
    }
}
