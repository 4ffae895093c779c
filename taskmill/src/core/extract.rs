//! Recovering summary candidates from free-form assistant text.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::core::summary::Summary;

/// Fenced code blocks, with or without a language tag.
static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[\w-]*[ \t]*\r?\n(.*?)```").unwrap());

/// Scan assistant text for an embedded summary: fenced code blocks first,
/// then a first balanced `{...}` span anywhere in the text.
pub fn candidate_from_text(text: &str) -> Option<Summary> {
    for caps in FENCE_RE.captures_iter(text) {
        let body = caps.get(1).unwrap().as_str().trim();
        if let Ok(value) = serde_json::from_str::<Value>(body) {
            if let Some(candidate) = Summary::from_value(&value) {
                return Some(candidate);
            }
        }
    }

    let span = balanced_object(text)?;
    let value = serde_json::from_str::<Value>(span).ok()?;
    Summary::from_value(&value)
}

/// Slice from the first `{` to its matching `}`, honoring JSON string
/// literals and escapes so braces inside strings do not end the span.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + idx + ch.len_utf8()]);
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

    #[test]
    fn fenced_json_block_yields_exactly_that_object() {
        let text = "```json\n{\"task_id\":\"T1\",\"status\":\"done\"}\n```";
        let candidate = candidate_from_text(text).expect("candidate");
        assert_eq!(candidate.task_id, "T1");
        assert_eq!(candidate.status, "done");
        assert!(candidate.summary.is_empty());
    }

    #[test]
    fn fence_without_language_tag_is_scanned() {
        let text = "All done.\n```\n{\"status\": \"done\", \"summary\": \"shipped\"}\n```\nbye";
        let candidate = candidate_from_text(text).expect("candidate");
        assert_eq!(candidate.summary, "shipped");
    }

    #[test]
    fn bare_object_in_prose_is_recovered() {
        let text = "Finished. {\"task_id\": \"T9\", \"status\": \"blocked\"} See notes.";
        let candidate = candidate_from_text(text).expect("candidate");
        assert_eq!(candidate.task_id, "T9");
        assert_eq!(candidate.status, "blocked");
    }

    #[test]
    fn braces_inside_string_literals_do_not_end_the_span() {
        let text = "{\"status\": \"done\", \"summary\": \"wrapped in {} braces \\\" quoted\"}";
        let candidate = candidate_from_text(text).expect("candidate");
        assert_eq!(candidate.summary, "wrapped in {} braces \" quoted");
    }

    #[test]
    fn nested_objects_balance() {
        let text = "prefix {\"status\": \"done\", \"extra\": {\"k\": 1}} suffix";
        let candidate = candidate_from_text(text).expect("candidate");
        assert_eq!(candidate.status, "done");
    }

    #[test]
    fn text_without_summary_json_yields_nothing() {
        assert_eq!(candidate_from_text("no structured payload here"), None);
        assert_eq!(candidate_from_text("unbalanced { \"status\": \"done\""), None);
        assert_eq!(candidate_from_text("```json\nnot json\n```"), None);
    }
}
