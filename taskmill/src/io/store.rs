//! Task file persistence.
//!
//! Every load validates the raw JSON before deserializing, so a hand-edited
//! or agent-mangled file surfaces as a list of violations instead of a serde
//! error deep in the loop. Every save rewrites the whole file: pretty-printed,
//! struct field order, trailing newline, atomic rename.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;

use crate::core::task::TaskFile;
use crate::io::schema::{self, SchemaKind};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path} failed validation ({} issues)", issues.len())]
    Invalid { path: PathBuf, issues: Vec<String> },
}

impl StoreError {
    /// True when the task file simply does not exist yet.
    pub fn is_missing(&self) -> bool {
        matches!(self, StoreError::Read { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }

    /// The violations to feed back to a repair agent. Parse failures count as
    /// a single violation; read failures are not repairable and return the
    /// plain error text.
    pub fn issues(&self) -> Vec<String> {
        match self {
            StoreError::Invalid { issues, .. } => issues.clone(),
            other => vec![other.to_string()],
        }
    }
}

/// Load and validate the task file at `path`.
pub fn load_tasks(path: &Path, schema_path: &Path) -> Result<TaskFile, StoreError> {
    let raw = fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&raw).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let issues = schema::validate_value(&value, schema_path, SchemaKind::Tasks);
    if !issues.is_empty() {
        return Err(StoreError::Invalid {
            path: path.to_path_buf(),
            issues,
        });
    }
    serde_json::from_value(value).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Rewrite the whole task file at `path`.
pub fn save_tasks(path: &Path, file: &TaskFile) -> Result<()> {
    let mut rendered = serde_json::to_string_pretty(file).context("serialize task file")?;
    rendered.push('\n');
    write_atomic(path, &rendered)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("rename {}", tmp.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::{Task, TaskStatus};

    fn sample_file() -> TaskFile {
        let mut file = TaskFile::default();
        file.source_files = vec!["src/lib.rs".to_string()];
        file.tasks.push(Task::new("T1", "First task", 1));
        file.tasks.push(Task::new("T2", "Second task", 3));
        file
    }

    #[test]
    fn save_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tasks.json");
        let schema_path = temp.path().join("absent.schema.json");

        save_tasks(&path, &sample_file()).expect("save");
        let loaded = load_tasks(&path, &schema_path).expect("load");
        assert_eq!(loaded.tasks.len(), 2);
        assert_eq!(loaded.tasks[0].id, "T1");
        assert_eq!(loaded.tasks[1].status, TaskStatus::Todo);
    }

    #[test]
    fn saved_file_is_pretty_with_trailing_newline_and_stable_keys() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tasks.json");

        save_tasks(&path, &sample_file()).expect("save");
        let raw = fs::read_to_string(&path).expect("read back");
        assert!(raw.ends_with("}\n"), "missing trailing newline");
        assert!(raw.contains("\n  \"tasks\""), "expected pretty output");

        let version = raw.find("schema_version").expect("schema_version key");
        let sources = raw.find("source_files").expect("source_files key");
        let tasks = raw.find("\"tasks\"").expect("tasks key");
        assert!(version < sources && sources < tasks, "key order drifted");
    }

    #[test]
    fn save_replaces_rather_than_merges() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tasks.json");
        let schema_path = temp.path().join("absent.schema.json");

        save_tasks(&path, &sample_file()).expect("save");
        let mut trimmed = sample_file();
        trimmed.tasks.truncate(1);
        save_tasks(&path, &trimmed).expect("save again");

        let loaded = load_tasks(&path, &schema_path).expect("load");
        assert_eq!(loaded.tasks.len(), 1);
    }

    #[test]
    fn missing_file_is_distinguishable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_tasks(&temp.path().join("absent.json"), &temp.path().join("s.json"))
            .expect_err("must fail");
        assert!(err.is_missing());
    }

    #[test]
    fn invalid_file_reports_issues() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tasks.json");
        fs::write(&path, r#"{"schema_version": 9, "source_files": [], "tasks": []}"#)
            .expect("write");

        let err = load_tasks(&path, &temp.path().join("absent.schema.json"))
            .expect_err("must fail validation");
        assert!(!err.is_missing());
        let issues = err.issues();
        assert!(
            issues.iter().any(|issue| issue.contains("schema_version")),
            "got {issues:?}"
        );
    }

    #[test]
    fn garbage_is_a_parse_failure_with_one_issue() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tasks.json");
        fs::write(&path, "not json at all").expect("write");

        let err = load_tasks(&path, &temp.path().join("s.json")).expect_err("must fail");
        assert!(matches!(err, StoreError::Parse { .. }));
        assert_eq!(err.issues().len(), 1);
    }
}
