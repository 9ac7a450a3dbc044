//! Pre-dispatch checks, run before any side-effecting work.

use serde_json::{Map, Value};

use crate::error::AgentError;

/// Shortest `data_str` that can hold a non-empty array of objects.
const MIN_PLOT_DATA_CHARS: usize = 10;

/// Trim, cap at `max_chars` characters and keep printable ASCII only.
pub fn sanitize_input(input: &str, max_chars: usize) -> String {
    input
        .trim()
        .chars()
        .take(max_chars)
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .collect()
}

/// Validate the `data_str` argument of the plotting tool and return its rows.
pub fn validate_plot_data(data_str: &str) -> Result<Vec<Map<String, Value>>, AgentError> {
    if data_str.trim().chars().count() < MIN_PLOT_DATA_CHARS {
        return Err(AgentError::Validation(
            "Data string too short or empty.".to_string(),
        ));
    }

    let parsed: Value = serde_json::from_str(data_str)
        .map_err(|e| AgentError::Validation(format!("Invalid JSON format. {e}")))?;

    let Value::Array(items) = parsed else {
        return Err(AgentError::Validation(
            "Data must be a JSON list of objects.".to_string(),
        ));
    };

    if items.is_empty() {
        return Err(AgentError::Validation("Data list is empty.".to_string()));
    }

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(row) => Ok(row),
            _ => Err(AgentError::Validation(format!(
                "Item {i} is not an object."
            ))),
        })
        .collect()
}
