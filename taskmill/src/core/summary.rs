//! Structured run summary reported by agents.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::task::TaskStatus;

/// Summary status meaning "deliberately did nothing"; never mutates the store.
pub const STATUS_SKIPPED: &str = "skipped";

/// What an agent claims to have done in one run.
///
/// Agents emit this over heterogeneous channels (a JSON line, an embedded
/// fenced block, a last-message file), so every field is optional on the wire
/// and `status` stays a free-form string; [`Summary::task_status`] does the
/// mapping into the task enum.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Summary {
    pub task_id: String,
    pub status: String,
    pub summary: String,
    pub files: Vec<String>,
    pub blockers: Vec<String>,
}

impl Summary {
    /// Field names that make a JSON object a summary candidate.
    pub const FIELDS: [&'static str; 5] = ["task_id", "status", "summary", "files", "blockers"];

    /// Lenient candidate construction from arbitrary JSON.
    ///
    /// Returns `None` unless the value is an object carrying at least one
    /// expected field, and at least one field is non-empty after extraction.
    /// Nulls and wrong-typed fields read as empty.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if !Self::FIELDS.iter().any(|field| obj.contains_key(*field)) {
            return None;
        }
        let candidate = Self {
            task_id: string_field(obj, "task_id"),
            status: string_field(obj, "status"),
            summary: string_field(obj, "summary"),
            files: list_field(obj, "files"),
            blockers: list_field(obj, "blockers"),
        };
        if candidate.is_empty() {
            return None;
        }
        Some(candidate)
    }

    pub fn is_empty(&self) -> bool {
        self.task_id.is_empty()
            && self.status.is_empty()
            && self.summary.is_empty()
            && self.files.is_empty()
            && self.blockers.is_empty()
    }

    /// Whether the agent deliberately skipped the task.
    pub fn is_skip(&self) -> bool {
        self.status == STATUS_SKIPPED
    }

    /// Map the reported status onto a task status. Unknown values fall back
    /// to `todo` so a garbled status re-queues the task instead of losing it.
    pub fn task_status(&self) -> TaskStatus {
        match self.status.as_str() {
            "done" => TaskStatus::Done,
            "blocked" => TaskStatus::Blocked,
            "doing" => TaskStatus::Doing,
            _ => TaskStatus::Todo,
        }
    }
}

fn string_field(obj: &serde_json::Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn list_field(obj: &serde_json::Map<String, Value>, key: &str) -> Vec<String> {
    obj.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
