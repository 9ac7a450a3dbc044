//! Tolerant recovery of JSON-like values from model output.
//!
//! Stages run in order and stop at the first success:
//! 1. JSON5 (trailing commas, comments, single-quoted strings)
//! 2. strict JSON
//! 3. repair: Python literals (`True`/`False`/`None`) outside string
//!    literals, then single→double quotes when no double quotes are present
//!
//! Standards-based stages come first; the repair stage rewrites text and can
//! damage legitimate content, so it only runs when both parsers reject the input.

use serde_json::Value;
use tracing::debug;

use crate::error::AgentError;

/// Characters of the offending text kept in a `MalformedPayload` error.
const PREVIEW_CHARS: usize = 50;

/// Parse a JSON-like fragment into a `serde_json::Value`.
pub fn parse_structured(text: &str) -> Result<Value, AgentError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AgentError::MalformedPayload {
            preview: String::new(),
        });
    }

    if let Ok(value) = json5::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    if let Some(value) = parse_repaired(trimmed) {
        debug!(preview = %preview(trimmed), "Payload recovered by literal/quote repair");
        return Ok(value);
    }

    Err(AgentError::MalformedPayload {
        preview: preview(trimmed),
    })
}

/// Parse a fragment that must be a JSON object.
pub fn parse_object(text: &str) -> Result<serde_json::Map<String, Value>, AgentError> {
    match parse_structured(text)? {
        Value::Object(map) => Ok(map),
        _ => Err(AgentError::MalformedPayload {
            preview: preview(text.trim()),
        }),
    }
}

fn parse_repaired(text: &str) -> Option<Value> {
    let repaired = replace_bare_literals(text);

    let mut candidates = vec![repaired.clone()];
    if repaired.contains('\'') && !repaired.contains('"') {
        candidates.push(repaired.replace('\'', "\""));
    }

    candidates.iter().find_map(|candidate| {
        json5::from_str::<Value>(candidate)
            .ok()
            .or_else(|| serde_json::from_str::<Value>(candidate).ok())
    })
}

/// Replace `True`/`False`/`None` tokens that appear outside string literals.
fn replace_bare_literals(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();
    let mut quote: Option<char> = None;
    let mut escape_next = false;

    while let Some((i, ch)) = chars.next() {
        if let Some(q) = quote {
            out.push(ch);
            if escape_next {
                escape_next = false;
            } else if ch == '\\' {
                escape_next = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }

        if ch == '"' || ch == '\'' {
            quote = Some(ch);
            out.push(ch);
            continue;
        }

        if is_ident_char(ch) {
            let mut end = i + ch.len_utf8();
            while let Some(&(j, next)) = chars.peek() {
                if !is_ident_char(next) {
                    break;
                }
                end = j + next.len_utf8();
                chars.next();
            }
            let word = &text[i..end];
            out.push_str(match word {
                "True" => "true",
                "False" => "false",
                "None" => "null",
                other => other,
            });
            continue;
        }

        out.push(ch);
    }

    out
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

/// Find the balanced `{ ... }` region starting at byte offset `start`.
///
/// `start` must point at `{`. Braces inside single- or double-quoted strings
/// are ignored. Returns the byte offset of the closing brace.
pub fn balanced_object_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escape_next = false;

    for (i, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match (quote, ch) {
            (Some(_), '\\') => escape_next = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(ch),
            (None, '{') => depth += 1,
            (None, '}') => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + i);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_clean_json() {
        let value = parse_structured(r#"{"question": "What was revenue in 2023?"}"#).unwrap();
        assert_eq!(value, json!({"question": "What was revenue in 2023?"}));
    }

    #[test]
    fn parse_python_style_dict() {
        let value = parse_structured("{'a': True, 'b': None,}").unwrap();
        assert_eq!(value, json!({"a": true, "b": null}));
    }

    #[test]
    fn lenient_stage_handles_comments_and_trailing_commas() {
        let value = parse_structured(
            "{\n  // the period\n  \"year\": 2024,\n  \"items\": [1, 2, 3,],\n}",
        )
        .unwrap();
        assert_eq!(value, json!({"year": 2024, "items": [1, 2, 3]}));
    }

    #[test]
    fn apostrophes_in_prose_survive() {
        let value =
            parse_structured(r#"{"question": "What was NVIDIA's revenue?", "flag": False}"#)
                .unwrap();
        assert_eq!(value["question"], "What was NVIDIA's revenue?");
        assert_eq!(value["flag"], false);
    }

    #[test]
    fn literals_inside_strings_are_not_rewritten() {
        let value = parse_structured(r#"{"note": "None of it is True", "ok": True}"#).unwrap();
        assert_eq!(value["note"], "None of it is True");
        assert_eq!(value["ok"], true);
    }

    #[test]
    fn roundtrip_serialized_values() {
        let values = [
            json!({"label": "FY2024", "value": 60.922, "year": 2024}),
            json!([{"a": [1, -2, 3.5]}, null, "text with \"quotes\" and 'ticks'"]),
            json!({"nested": {"deep": {"list": [], "empty": {}}}, "unicode": "€ 日本"}),
            json!(true),
            json!("plain"),
        ];
        for value in values {
            let text = serde_json::to_string(&value).unwrap();
            assert_eq!(parse_structured(&text).unwrap(), value, "input: {text}");
        }
    }

    #[test]
    fn empty_input_fails_without_parsing() {
        assert!(matches!(
            parse_structured(""),
            Err(AgentError::MalformedPayload { .. })
        ));
        assert!(matches!(
            parse_structured("   \n"),
            Err(AgentError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn garbage_fails_with_preview() {
        match parse_structured("not json at all {{{") {
            Err(AgentError::MalformedPayload { preview }) => {
                assert_eq!(preview, "not json at all {{{");
            }
            other => panic!("expected MalformedPayload, got {other:?}"),
        }
    }

    #[test]
    fn long_preview_is_truncated() {
        let input = format!("{{{}", "x".repeat(200));
        match parse_structured(&input) {
            Err(AgentError::MalformedPayload { preview }) => {
                assert_eq!(preview.chars().count(), PREVIEW_CHARS + 3);
                assert!(preview.ends_with("..."));
            }
            other => panic!("expected MalformedPayload, got {other:?}"),
        }
    }

    #[test]
    fn parse_object_rejects_non_objects() {
        assert!(parse_object("[1, 2]").is_err());
        assert_eq!(parse_object("{'q': 1}").unwrap()["q"], 1);
    }

    #[test]
    fn balanced_end_skips_braces_in_strings() {
        let text = r#"ARGS: {"reasoning": "from {low} to {high}", "n": {"x": 1}} trailing }"#;
        let start = text.find('{').unwrap();
        let end = balanced_object_end(text, start).unwrap();
        assert_eq!(
            &text[start..=end],
            r#"{"reasoning": "from {low} to {high}", "n": {"x": 1}}"#
        );
    }

    #[test]
    fn balanced_end_none_when_unclosed() {
        let text = r#"{"a": {"b": 1}"#;
        assert_eq!(balanced_object_end(text, 0), None);
    }
}
