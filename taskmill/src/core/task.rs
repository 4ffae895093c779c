//! Task list model persisted in the task file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version the loop reads and writes.
pub const SCHEMA_VERSION: u64 = 1;

/// Id of the synthetic terminal task appended when the project completes.
pub const PROJECT_DONE_ID: &str = "PROJECT-DONE";

/// Tag carried by the terminal task so a renamed copy is still recognized.
pub const PROJECT_DONE_TAG: &str = "project-done";

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Todo,
    Doing,
    Blocked,
    Done,
}

impl TaskStatus {
    /// Accepted wire strings, in declaration order.
    pub const ALL: [&'static str; 4] = ["todo", "doing", "blocked", "done"];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::Doing => "doing",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Done => "done",
        }
    }
}

/// One unit of work. Mutate only through [`TaskFile`] methods so `updated_at`
/// stays accurate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub title: String,
    /// 1 (most urgent) through 5 (least urgent).
    pub priority: u8,
    pub status: TaskStatus,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub blockers: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    /// New tasks enter the list as `todo`.
    pub fn new(id: impl Into<String>, title: impl Into<String>, priority: u8) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            priority,
            status: TaskStatus::Todo,
            details: String::new(),
            steps: Vec::new(),
            blockers: Vec::new(),
            tags: Vec::new(),
            files: Vec::new(),
            depends_on: Vec::new(),
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    /// Whether this task is the terminal `PROJECT-DONE` marker.
    pub fn is_project_done_marker(&self) -> bool {
        self.id == PROJECT_DONE_ID || self.tags.iter().any(|tag| tag == PROJECT_DONE_TAG)
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

/// Whole-file task store structure. Tasks are never removed, only appended
/// and mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskFile {
    pub schema_version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default)]
    pub source_files: Vec<String>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Default for TaskFile {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            project: None,
            source_files: Vec::new(),
            tasks: Vec::new(),
        }
    }
}

impl TaskFile {
    /// First `todo` task in list order. List order is the work order; priority
    /// is advisory metadata for the agents, not a sort key.
    pub fn first_todo(&self) -> Option<&Task> {
        self.tasks.iter().find(|task| task.status == TaskStatus::Todo)
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| task.id == id)
    }

    /// Set the status of an existing task, stamping `updated_at`. Returns
    /// false when no task has the given id.
    pub fn set_status(&mut self, id: &str, status: TaskStatus) -> bool {
        match self.get_mut(id) {
            Some(task) => {
                task.status = status;
                task.touch();
                true
            }
            None => false,
        }
    }

    pub fn has_project_done(&self) -> bool {
        self.tasks.iter().any(Task::is_project_done_marker)
    }

    /// Append the terminal marker task. Idempotent: returns false without
    /// touching the list when a marker (by id or tag) already exists.
    pub fn append_project_done(&mut self) -> bool {
        if self.has_project_done() {
            return false;
        }
        let mut marker = Task::new(PROJECT_DONE_ID, "Project complete", 5);
        marker.status = TaskStatus::Done;
        marker.details = "All tasks finished and review produced no follow-up work.".to_string();
        marker.tags.push(PROJECT_DONE_TAG.to_string());
        self.tasks.push(marker);
        true
    }
}
