//! Post-transition hook execution.

use std::fs;
use std::path::Path;
use std::process::Command;

use tracing::{debug, warn};

/// Runs after an iteration or review lands a summary. Failures are reported
/// and swallowed; the loop never depends on hook success.
pub trait HookRunner: Send {
    fn fire(&self, task_id: &str, status: &str, last_message: &Path, label: &str);
}

/// Invokes the configured command with four positional arguments appended:
/// task id, status, last-message path, label.
pub struct CommandHook {
    command: Vec<String>,
}

impl CommandHook {
    pub fn new(command: &[String]) -> Self {
        Self {
            command: command.to_vec(),
        }
    }
}

impl HookRunner for CommandHook {
    /// Preconditions: a non-empty command and a last-message file that
    /// exists, is non-empty, and holds valid JSON. Anything else skips
    /// quietly so a hook never fires on a run that left no usable trace.
    fn fire(&self, task_id: &str, status: &str, last_message: &Path, label: &str) {
        let Some((program, fixed)) = self.command.split_first() else {
            return;
        };
        let raw = match fs::read_to_string(last_message) {
            Ok(raw) => raw,
            Err(err) => {
                debug!("hook skipped, last message unreadable: {err}");
                return;
            }
        };
        if raw.trim().is_empty() {
            debug!("hook skipped, last message empty");
            return;
        }
        if serde_json::from_str::<serde_json::Value>(&raw).is_err() {
            debug!("hook skipped, last message is not JSON");
            return;
        }

        let result = Command::new(program)
            .args(fixed)
            .arg(task_id)
            .arg(status)
            .arg(last_message)
            .arg(label)
            .status();
        match result {
            Ok(exit) if exit.success() => {}
            Ok(exit) => warn!("hook {program} exited with {exit}"),
            Err(err) => warn!("hook {program} failed to start: {err}"),
        }
    }
}
