//! Applying a run [`Summary`] to the task file.

use crate::core::summary::Summary;
use crate::core::task::{Task, TaskFile};

/// Priority assigned to tasks created by a summary (agents did not rank them).
const CREATED_PRIORITY: u8 = 2;

/// What applying a summary did to the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// `status == "skipped"` or no usable target; nothing changed.
    Skipped,
    Updated { id: String },
    Created { id: String },
}

/// Merge a validated summary into the file. Callers resolve `target_id`
/// (the summary's own task id, or the running task when the summary leaves it
/// empty) and persist the file afterwards.
pub fn apply_summary(file: &mut TaskFile, target_id: &str, summary: &Summary) -> ApplyOutcome {
    if summary.is_skip() || target_id.is_empty() {
        return ApplyOutcome::Skipped;
    }

    let status = summary.task_status();
    if let Some(task) = file.get_mut(target_id) {
        task.status = status;
        if !summary.summary.is_empty() {
            task.details = summary.summary.clone();
        }
        merge_unique(&mut task.files, &summary.files);
        merge_unique(&mut task.blockers, &summary.blockers);
        task.touch();
        return ApplyOutcome::Updated {
            id: target_id.to_string(),
        };
    }

    let title = if summary.summary.is_empty() {
        target_id.to_string()
    } else {
        summary.summary.clone()
    };
    let mut task = Task::new(target_id, title, CREATED_PRIORITY);
    task.status = status;
    task.details = summary.summary.clone();
    task.files = summary.files.clone();
    task.blockers = summary.blockers.clone();
    file.tasks.push(task);
    ApplyOutcome::Created {
        id: target_id.to_string(),
    }
}

/// Append values not already present, keeping existing order.
fn merge_unique(existing: &mut Vec<String>, incoming: &[String]) {
    for value in incoming {
        if !existing.iter().any(|have| have == value) {
            existing.push(value.clone());
        }
    }
}
