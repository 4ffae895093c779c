//! Minimal validation rules for task files and summaries.
//!
//! These run against raw JSON values and are the guaranteed fallback when no
//! schema resource is available. Reported paths use the same dot/bracket
//! notation as the schema validator (`tasks[2].status`).

use std::collections::HashSet;

use serde_json::Value;

use crate::core::task::{SCHEMA_VERSION, TaskStatus};

/// Validate a task-file value. Returns one message per violation; empty means
/// valid.
pub fn check_task_file(value: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(obj) = value.as_object() else {
        return vec!["task file root must be an object".to_string()];
    };

    match obj.get("schema_version").and_then(Value::as_u64) {
        Some(SCHEMA_VERSION) => {}
        Some(other) => errors.push(format!(
            "schema_version: expected {SCHEMA_VERSION}, found {other}"
        )),
        None => errors.push("schema_version: missing or not an integer".to_string()),
    }

    match obj.get("source_files") {
        Some(Value::Array(_)) => {}
        Some(_) => errors.push("source_files: must be an array".to_string()),
        None => errors.push("source_files: missing".to_string()),
    }

    match obj.get("tasks") {
        Some(Value::Array(tasks)) => check_tasks(tasks, &mut errors),
        Some(_) => errors.push("tasks: must be an array".to_string()),
        None => errors.push("tasks: missing".to_string()),
    }

    errors
}

fn check_tasks(tasks: &[Value], errors: &mut Vec<String>) {
    let mut seen_ids: HashSet<&str> = HashSet::new();
    let mut markers = 0usize;
    for (index, task) in tasks.iter().enumerate() {
        let path = format!("tasks[{index}]");
        let Some(obj) = task.as_object() else {
            errors.push(format!("{path}: must be an object"));
            continue;
        };

        match obj.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => {
                if !seen_ids.insert(id) {
                    errors.push(format!("{path}.id: duplicate id {id:?}"));
                }
            }
            _ => errors.push(format!("{path}.id: missing or empty")),
        }

        match obj.get("title").and_then(Value::as_str) {
            Some(title) if !title.is_empty() => {}
            _ => errors.push(format!("{path}.title: missing or empty")),
        }

        match obj.get("priority").and_then(Value::as_u64) {
            Some(1..=5) => {}
            _ => errors.push(format!("{path}.priority: must be an integer from 1 to 5")),
        }

        match obj.get("status").and_then(Value::as_str) {
            Some(status) if TaskStatus::ALL.contains(&status) => {}
            _ => errors.push(format!(
                "{path}.status: must be one of {}",
                TaskStatus::ALL.join(", ")
            )),
        }

        if is_marker(obj) {
            markers += 1;
        }
    }

    if markers > 1 {
        errors.push("tasks: more than one PROJECT-DONE marker".to_string());
    }

    // Second pass: depends_on entries must name known tasks.
    for (index, task) in tasks.iter().enumerate() {
        let Some(deps) = task.get("depends_on").and_then(Value::as_array) else {
            continue;
        };
        for (dep_index, dep) in deps.iter().enumerate() {
            match dep.as_str() {
                Some(id) if seen_ids.contains(id) => {}
                Some(id) => errors.push(format!(
                    "tasks[{index}].depends_on[{dep_index}]: unknown task {id:?}"
                )),
                None => errors.push(format!(
                    "tasks[{index}].depends_on[{dep_index}]: must be a string"
                )),
            }
        }
    }
}

fn is_marker(obj: &serde_json::Map<String, Value>) -> bool {
    use crate::core::task::{PROJECT_DONE_ID, PROJECT_DONE_TAG};
    if obj.get("id").and_then(Value::as_str) == Some(PROJECT_DONE_ID) {
        return true;
    }
    obj.get("tags")
        .and_then(Value::as_array)
        .is_some_and(|tags| tags.iter().any(|tag| tag.as_str() == Some(PROJECT_DONE_TAG)))
}

/// Validate a summary value: structural type checks only. The status string
/// is deliberately unconstrained; merge maps unknown values to `todo`.
pub fn check_summary(value: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(obj) = value.as_object() else {
        return vec!["summary root must be an object".to_string()];
    };

    for key in ["task_id", "status", "summary"] {
        match obj.get(key) {
            None | Some(Value::String(_)) | Some(Value::Null) => {}
            Some(_) => errors.push(format!("{key}: must be a string")),
        }
    }

    for key in ["files", "blockers"] {
        match obj.get(key) {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                for (index, item) in items.iter().enumerate() {
                    if !item.is_string() {
                        errors.push(format!("{key}[{index}]: must be a string"));
                    }
                }
            }
            Some(_) => errors.push(format!("{key}: must be an array of strings")),
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_file() -> Value {
        json!({
            "schema_version": 1,
            "source_files": ["src/main.rs"],
            "tasks": [
                {"id": "T1", "title": "one", "priority": 1, "status": "todo"},
                {"id": "T2", "title": "two", "priority": 5, "status": "done",
                 "depends_on": ["T1"]}
            ]
        })
    }

    #[test]
    fn valid_file_has_no_errors() {
        assert!(check_task_file(&valid_file()).is_empty());
    }

    #[test]
    fn missing_top_level_keys_are_reported() {
        let errors = check_task_file(&json!({"schema_version": 2}));
        assert!(errors.iter().any(|e| e.contains("schema_version")));
        assert!(errors.iter().any(|e| e == "source_files: missing"));
        assert!(errors.iter().any(|e| e == "tasks: missing"));
    }

    #[test]
    fn task_violations_carry_bracket_paths() {
        let mut file = valid_file();
        file["tasks"][1] = json!({"id": "", "title": "x", "priority": 9, "status": "paused"});
        let errors = check_task_file(&file);
        assert!(errors.iter().any(|e| e.starts_with("tasks[1].id:")));
        assert!(errors.iter().any(|e| e.starts_with("tasks[1].priority:")));
        assert!(errors.iter().any(|e| e.starts_with("tasks[1].status:")));
    }

    #[test]
    fn duplicate_ids_and_unknown_dependencies_are_reported() {
        let file = json!({
            "schema_version": 1,
            "source_files": [],
            "tasks": [
                {"id": "T1", "title": "a", "priority": 1, "status": "todo"},
                {"id": "T1", "title": "b", "priority": 1, "status": "todo",
                 "depends_on": ["NOPE"]}
            ]
        });
        let errors = check_task_file(&file);
        assert!(errors.iter().any(|e| e.contains("duplicate id")));
        assert!(errors.iter().any(|e| e.contains("depends_on[0]") && e.contains("NOPE")));
    }

    #[test]
    fn two_project_done_markers_are_invalid() {
        let file = json!({
            "schema_version": 1,
            "source_files": [],
            "tasks": [
                {"id": "PROJECT-DONE", "title": "done", "priority": 5, "status": "done"},
                {"id": "FINAL", "title": "done again", "priority": 5, "status": "done",
                 "tags": ["project-done"]}
            ]
        });
        let errors = check_task_file(&file);
        assert!(errors.iter().any(|e| e.contains("more than one PROJECT-DONE")));
    }

    #[test]
    fn summary_type_errors_are_reported() {
        let errors = check_summary(&json!({
            "task_id": 7,
            "status": "done",
            "files": ["ok", 3]
        }));
        assert!(errors.iter().any(|e| e.starts_with("task_id:")));
        assert!(errors.iter().any(|e| e == "files[1]: must be a string"));
        assert!(check_summary(&json!({"status": "done"})).is_empty());
        assert!(check_summary(&json!({"task_id": null, "status": "skipped"})).is_empty());
    }
}
