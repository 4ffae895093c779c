//! Schema-backed validation with a minimal-rule fallback.

use std::fs;
use std::path::Path;

use jsonschema::Draft;
use serde_json::Value;
use tracing::debug;

use crate::core::checks;

/// Which fallback rule set applies when no schema resource loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Tasks,
    Summary,
}

/// Validate `value` against the schema at `schema_path` when one loads,
/// otherwise against the minimal rules for `kind`. Returns one message per
/// violation with dot/bracket instance paths; empty means valid.
pub fn validate_value(value: &Value, schema_path: &Path, kind: SchemaKind) -> Vec<String> {
    match compiled_schema(schema_path) {
        Some(validator) => validator
            .iter_errors(value)
            .map(|err| {
                let path = bracket_path(&err.instance_path().to_string());
                if path.is_empty() {
                    err.to_string()
                } else {
                    format!("{path}: {err}")
                }
            })
            .collect(),
        None => match kind {
            SchemaKind::Tasks => checks::check_task_file(value),
            SchemaKind::Summary => checks::check_summary(value),
        },
    }
}

fn compiled_schema(path: &Path) -> Option<jsonschema::Validator> {
    let raw = fs::read_to_string(path).ok()?;
    let schema: Value = match serde_json::from_str(&raw) {
        Ok(schema) => schema,
        Err(err) => {
            debug!(path = %path.display(), %err, "schema resource is not JSON, using minimal rules");
            return None;
        }
    };
    match jsonschema::options().with_draft(Draft::Draft202012).build(&schema) {
        Ok(validator) => Some(validator),
        Err(err) => {
            debug!(path = %path.display(), %err, "schema did not compile, using minimal rules");
            None
        }
    }
}

/// Render a JSON pointer (`/tasks/2/status`) dot/bracket style
/// (`tasks[2].status`).
fn bracket_path(pointer: &str) -> String {
    let mut out = String::new();
    for segment in pointer.split('/').skip(1) {
        if segment.is_empty() {
            continue;
        }
        let unescaped = segment.replace("~1", "/").replace("~0", "~");
        if unescaped.chars().all(|c| c.is_ascii_digit()) {
            out.push('[');
            out.push_str(&unescaped);
            out.push(']');
        } else {
            if !out.is_empty() {
                out.push('.');
            }
            out.push_str(&unescaped);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pointer_renders_dot_bracket_style() {
        assert_eq!(bracket_path(""), "");
        assert_eq!(bracket_path("/tasks/2/status"), "tasks[2].status");
        assert_eq!(bracket_path("/source_files/0"), "source_files[0]");
        assert_eq!(bracket_path("/project"), "project");
    }

    #[test]
    fn schema_violations_report_instance_paths() {
        let temp = tempfile::tempdir().expect("tempdir");
        let schema_path = temp.path().join("schema.json");
        fs::write(
            &schema_path,
            json!({
                "type": "object",
                "properties": {
                    "tasks": {
                        "type": "array",
                        "items": {"type": "object", "required": ["id"]}
                    }
                }
            })
            .to_string(),
        )
        .expect("write schema");

        let errors = validate_value(
            &json!({"tasks": [{"id": "T1"}, {}]}),
            &schema_path,
            SchemaKind::Tasks,
        );
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("tasks[1]:"), "got {errors:?}");
    }

    #[test]
    fn missing_schema_falls_back_to_minimal_rules() {
        let temp = tempfile::tempdir().expect("tempdir");
        let schema_path = temp.path().join("absent.json");

        let valid = json!({"schema_version": 1, "source_files": [], "tasks": []});
        assert!(validate_value(&valid, &schema_path, SchemaKind::Tasks).is_empty());

        let invalid = json!({"schema_version": 3});
        let errors = validate_value(&invalid, &schema_path, SchemaKind::Tasks);
        assert!(!errors.is_empty());
    }

    #[test]
    fn unparseable_schema_falls_back_to_minimal_rules() {
        let temp = tempfile::tempdir().expect("tempdir");
        let schema_path = temp.path().join("schema.json");
        fs::write(&schema_path, "{ not json").expect("write");

        assert!(validate_value(&json!({"status": "done"}), &schema_path, SchemaKind::Summary)
            .is_empty());
    }
}
