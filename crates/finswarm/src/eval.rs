//! Numeric-match scoring of recorded benchmark answers.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

/// A ground-truth number matches an answer number when they differ by less than this.
fn tolerance() -> Decimal {
    Decimal::new(1, 2)
}

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-+]?\d*\.\d+|\d+").expect("valid number pattern"));

/// Every number in `text`, in order. Thousands separators are ignored.
pub fn extract_numbers(text: &str) -> Vec<Decimal> {
    let text = text.replace(',', "");
    NUMBER_RE
        .find_iter(&text)
        .filter_map(|m| parse_number(m.as_str()))
        .collect()
}

fn parse_number(token: &str) -> Option<Decimal> {
    let (sign, digits) = match token.strip_prefix(['-', '+']) {
        Some(rest) => (&token[..1], rest),
        None => ("", token),
    };
    let digits = if digits.starts_with('.') {
        format!("0{digits}")
    } else {
        digits.to_string()
    };
    let sign = if sign == "-" { "-" } else { "" };
    Decimal::from_str(&format!("{sign}{digits}")).ok()
}

/// True when any number in `answer` is within tolerance of the first number
/// in `ground_truth`. An empty or `N/A` ground truth never matches.
pub fn numbers_match(answer: &str, ground_truth: &str) -> bool {
    let ground_truth = ground_truth.trim();
    if ground_truth.is_empty() || ground_truth == "N/A" {
        return false;
    }

    let Some(expected) = extract_numbers(ground_truth).into_iter().next() else {
        return false;
    };

    extract_numbers(answer)
        .into_iter()
        .any(|n| (n - expected).abs() < tolerance())
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Metrics {
    pub accuracy: f64,
    pub avg_latency: f64,
    pub total_samples: usize,
}

fn text_field(row: &Map<String, Value>, key: &str) -> String {
    match row.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Annotate each row with `is_correct` and summarise the run.
///
/// Rows keep any extra fields they came with.
pub fn score_rows(rows: &mut [Map<String, Value>]) -> Metrics {
    if rows.is_empty() {
        return Metrics {
            accuracy: 0.0,
            avg_latency: 0.0,
            total_samples: 0,
        };
    }

    let mut correct = 0usize;
    let mut latency_total = 0.0;
    for row in rows.iter_mut() {
        let is_correct = numbers_match(
            &text_field(row, "model_answer"),
            &text_field(row, "ground_truth"),
        );
        if is_correct {
            correct += 1;
        }
        latency_total += row.get("latency_s").and_then(Value::as_f64).unwrap_or(0.0);
        row.insert("is_correct".to_string(), Value::Bool(is_correct));
    }

    let total = rows.len();
    Metrics {
        accuracy: correct as f64 / total as f64,
        avg_latency: latency_total / total as f64,
        total_samples: total,
    }
}

/// `results.json` -> `results_scored.json`, next to the input.
pub fn scored_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "results".to_string());
    input.with_file_name(format!("{stem}_scored.json"))
}

/// Score a results file and return the metrics along with where the annotated
/// rows were written.
pub fn evaluate_file(input: &Path) -> Result<(Metrics, PathBuf)> {
    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read results: {}", input.display()))?;
    let mut rows: Vec<Map<String, Value>> = serde_json::from_str(&raw)
        .with_context(|| format!("Results must be a JSON list of objects: {}", input.display()))?;

    let metrics = score_rows(&mut rows);

    let output = scored_path(input);
    std::fs::write(&output, serde_json::to_string_pretty(&rows)?)
        .with_context(|| format!("Failed to write scored results: {}", output.display()))?;

    info!(
        accuracy = metrics.accuracy,
        avg_latency = metrics.avg_latency,
        total_samples = metrics.total_samples,
        output = %output.display(),
        "Evaluation complete"
    );
    Ok((metrics, output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn rows(value: Value) -> Vec<Map<String, Value>> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn extracts_numbers_ignoring_commas() {
        assert_eq!(
            extract_numbers("Revenue was $60,922 million, up 125.9% (-.5 adj)"),
            vec![dec!(60922), dec!(125.9), dec!(-0.5)]
        );
    }

    #[test]
    fn any_answer_number_may_match() {
        assert!(numbers_match(
            "Fiscal 2024 revenue was $60,922 million.",
            "60922"
        ));
        assert!(numbers_match("Growth of 125.85%", "125.854"));
        assert!(!numbers_match("Growth of 125.8%", "125.85"));
    }

    #[test]
    fn first_ground_truth_number_is_the_target() {
        assert!(numbers_match("It was 26.97 billion", "26.97 (FY2023: 26.97)"));
        assert!(!numbers_match("It was 2023", "26.97 in 2023"));
    }

    #[test]
    fn unusable_ground_truth_never_matches() {
        assert!(!numbers_match("42", "N/A"));
        assert!(!numbers_match("42", "  "));
        assert!(!numbers_match("42", "not reported"));
    }

    #[test]
    fn scores_rows_and_keeps_extra_fields() {
        let mut data = rows(json!([
            {"question": "q1", "model_answer": "60,922", "ground_truth": "60922", "latency_s": 2.0, "run": 1},
            {"question": "q2", "model_answer": "unknown", "ground_truth": 14.5, "latency_s": 4.0},
            {"question": "q3", "model_answer": "7", "ground_truth": "N/A"},
            {"question": "q4", "model_answer": "14.50", "ground_truth": 14.5, "latency_s": 6.0}
        ]));

        let metrics = score_rows(&mut data);
        assert_eq!(metrics.total_samples, 4);
        assert!((metrics.accuracy - 0.5).abs() < f64::EPSILON);
        assert!((metrics.avg_latency - 3.0).abs() < f64::EPSILON);

        let flags: Vec<bool> = data
            .iter()
            .map(|r| r["is_correct"].as_bool().unwrap())
            .collect();
        assert_eq!(flags, vec![true, false, false, true]);
        assert_eq!(data[0]["run"], json!(1));
    }

    #[test]
    fn empty_results_score_zero() {
        let metrics = score_rows(&mut []);
        assert_eq!(metrics.total_samples, 0);
        assert_eq!(metrics.accuracy, 0.0);
    }

    #[test]
    fn scored_path_sits_next_to_input() {
        assert_eq!(
            scored_path(Path::new("/tmp/bench/results.json")),
            PathBuf::from("/tmp/bench/results_scored.json")
        );
    }

    #[test]
    fn evaluate_file_writes_annotated_rows() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("results.json");
        std::fs::write(
            &input,
            json!([
                {"question": "q", "model_answer": "$130.5 billion", "ground_truth": "130.5", "latency_s": 1.5}
            ])
            .to_string(),
        )
        .unwrap();

        let (metrics, output) = evaluate_file(&input).unwrap();
        assert_eq!(metrics.total_samples, 1);
        assert_eq!(metrics.accuracy, 1.0);

        let written: Vec<Map<String, Value>> =
            serde_json::from_str(&std::fs::read_to_string(output).unwrap()).unwrap();
        assert_eq!(written[0]["is_correct"], json!(true));
    }

    #[test]
    fn evaluate_file_rejects_non_list() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bad.json");
        std::fs::write(&input, r#"{"question": "q"}"#).unwrap();
        assert!(evaluate_file(&input).is_err());
    }
}
