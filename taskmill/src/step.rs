//! One loop iteration: select a task, run the scheduled agent, merge.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::cancel::CancelToken;
use crate::core::merge::{self, ApplyOutcome};
use crate::core::summary::Summary;
use crate::core::task::{TaskFile, TaskStatus};
use crate::io::agent::Agent;
use crate::io::config::LoopConfig;
use crate::io::events::{JsonlSink, SharedSink};
use crate::io::hook::HookRunner;
use crate::io::paths;
use crate::io::prompt::PromptEngine;
use crate::io::runner::RunError;
use crate::io::schema::{self, SchemaKind};
use crate::io::store;
use crate::validate;

/// Shared wiring for bootstrap, iteration, repair, and review runs.
pub struct StepContext<'a> {
    pub config: &'a LoopConfig,
    pub runs_dir: &'a Path,
    pub engine: &'a PromptEngine,
    pub agents: &'a BTreeMap<String, Box<dyn Agent>>,
    pub hook: &'a dyn HookRunner,
    pub cancel: &'a CancelToken,
}

impl StepContext<'_> {
    pub fn agent(&self, name: &str) -> Result<&dyn Agent> {
        self.agents
            .get(name)
            .map(|agent| agent.as_ref())
            .with_context(|| format!("agent '{name}' is not configured"))
    }

    /// Last-message path of a configured agent, empty when unknown.
    pub fn last_message_for(&self, agent_name: &str) -> PathBuf {
        self.config
            .agents
            .get(agent_name)
            .map(|agent| agent.last_message_path.clone())
            .unwrap_or_default()
    }
}

pub fn cancelled_error() -> anyhow::Error {
    anyhow::Error::new(RunError::Cancelled)
}

/// True when `err` carries the runner's cancellation sentinel.
pub fn is_cancelled(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<RunError>(), Some(RunError::Cancelled))
}

/// What happened to the Summary an iteration produced.
#[derive(Debug, PartialEq, Eq)]
pub enum Disposition {
    Applied(ApplyOutcome),
    /// Summary named a different task; discarded, the loop continues.
    Mismatch { reported: String },
    /// Summary failed validation; discarded, the loop continues.
    Invalid { issues: Vec<String> },
}

#[derive(Debug)]
pub struct IterationReport {
    pub task_id: String,
    pub agent: String,
    pub status: String,
    pub disposition: Disposition,
}

/// Run one iteration. `Ok(None)` means no `todo` task remained.
pub fn run_iteration(ctx: &StepContext, iteration: u32) -> Result<Option<IterationReport>> {
    if ctx.cancel.is_cancelled() {
        return Err(cancelled_error());
    }
    let mut file = validate::load_with_repair(ctx)?;
    let Some(task) = file.first_todo().cloned() else {
        return Ok(None);
    };
    let task_id = task.id.clone();
    let agent_name = ctx.config.schedule.agent_for(iteration).to_string();
    let agent = ctx.agent(&agent_name)?;
    info!("iteration {iteration}: task {task_id} via {agent_name}");

    file.set_status(&task_id, TaskStatus::Doing);
    store::save_tasks(&ctx.config.tasks_path, &file)?;

    let prompt = ctx.engine.iteration_prompt(&ctx.config.tasks_path, &task)?;
    let summary = match run_agent(ctx, "iteration", &task_id, agent, &prompt) {
        Ok(summary) => summary,
        Err(err) => {
            // Cancellation leaves the task `doing` so a rerun resumes it;
            // real failures mark it `blocked` before halting the loop.
            if !is_cancelled(&err) {
                mark_blocked(ctx, &task_id);
            }
            return Err(err);
        }
    };

    // Agents may have edited the file while working; reload before merging.
    let mut file = validate::load_with_repair(ctx)?;
    let disposition = apply_iteration_summary(ctx, &mut file, &task_id, &summary)?;
    let report = IterationReport {
        task_id,
        agent: agent_name,
        status: summary.status.clone(),
        disposition,
    };
    if matches!(report.disposition, Disposition::Applied(_)) {
        ctx.hook.fire(
            &report.task_id,
            &report.status,
            &ctx.last_message_for(&report.agent),
            &format!("iteration-{iteration}"),
        );
    }
    Ok(Some(report))
}

fn apply_iteration_summary(
    ctx: &StepContext,
    file: &mut TaskFile,
    task_id: &str,
    summary: &Summary,
) -> Result<Disposition> {
    let value = serde_json::to_value(summary).context("serialize summary")?;
    let issues = schema::validate_value(&value, &ctx.config.summary_schema_path, SchemaKind::Summary);
    if !issues.is_empty() {
        error!("summary for {task_id} failed validation: {}", issues.join("; "));
        return Ok(Disposition::Invalid { issues });
    }
    if !summary.task_id.is_empty() && summary.task_id != task_id {
        error!(
            "summary names task {} but {task_id} was running; discarded",
            summary.task_id
        );
        return Ok(Disposition::Mismatch {
            reported: summary.task_id.clone(),
        });
    }
    let outcome = merge::apply_summary(file, task_id, summary);
    if outcome != ApplyOutcome::Skipped {
        store::save_tasks(&ctx.config.tasks_path, file)?;
    }
    Ok(Disposition::Applied(outcome))
}

fn mark_blocked(ctx: &StepContext, task_id: &str) {
    match store::load_tasks(&ctx.config.tasks_path, &ctx.config.tasks_schema_path) {
        Ok(mut file) => {
            file.set_status(task_id, TaskStatus::Blocked);
            if let Err(err) = store::save_tasks(&ctx.config.tasks_path, &file) {
                warn!("could not persist blocked status for {task_id}: {err:#}");
            }
        }
        Err(err) => warn!("could not mark {task_id} blocked: {err}"),
    }
}

/// Run one agent with full artifact capture: a fresh run directory holding
/// `prompt.md`, `events.jsonl`, and `meta.json`.
pub(crate) fn run_agent(
    ctx: &StepContext,
    label: &str,
    task_id: &str,
    agent: &dyn Agent,
    prompt: &str,
) -> Result<Summary> {
    let run_dir = paths::next_run_dir(ctx.runs_dir, label)?;
    let prompt_path = run_dir.join("prompt.md");
    fs::write(&prompt_path, prompt).with_context(|| format!("write {}", prompt_path.display()))?;
    let sink = SharedSink::new(JsonlSink::create(&run_dir.join("events.jsonl"))?);

    let started = Utc::now();
    let result = agent.run(prompt, &sink, ctx.cancel);
    let finished = Utc::now();

    let meta = serde_json::json!({
        "label": label,
        "task_id": task_id,
        "agent": agent.name(),
        "started_at": started,
        "finished_at": finished,
        "result": match &result {
            Ok(summary) if summary.status.is_empty() => "summary".to_string(),
            Ok(summary) => format!("summary ({})", summary.status),
            Err(err) => format!("error: {err}"),
        },
    });
    let mut rendered = serde_json::to_string_pretty(&meta).context("serialize run meta")?;
    rendered.push('\n');
    let meta_path = run_dir.join("meta.json");
    match result {
        Ok(summary) => {
            fs::write(&meta_path, rendered)
                .with_context(|| format!("write {}", meta_path.display()))?;
            Ok(summary)
        }
        Err(err) => {
            // Best effort once the run itself has failed.
            if let Err(write_err) = fs::write(&meta_path, rendered) {
                warn!("write {}: {write_err}", meta_path.display());
            }
            Err(anyhow::Error::new(err)
                .context(format!("{label} agent '{}' failed", agent.name())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::Task;
    use crate::test_support::{Harness, ScriptedAgent, scripted_summary};
    use std::sync::Arc;

    fn two_task_file() -> TaskFile {
        let mut file = TaskFile::default();
        file.tasks.push(Task::new("T1", "First", 3));
        file.tasks.push(Task::new("T2", "Second", 1));
        file
    }

    #[test]
    fn first_todo_in_list_order_wins_over_priority() {
        let mut harness = Harness::new();
        harness.seed_tasks(&two_task_file());
        let agent = Arc::new(ScriptedAgent::new("codex"));
        agent.push_summary(scripted_summary("T1", "done", "finished first"));
        harness.install("codex", agent.clone());

        let report = run_iteration(&harness.ctx(), 1)
            .expect("iteration runs")
            .expect("work existed");
        // T2 has the better priority but T1 comes first in the list.
        assert_eq!(report.task_id, "T1");
        assert_eq!(
            report.disposition,
            Disposition::Applied(ApplyOutcome::Updated {
                id: "T1".to_string()
            })
        );
        let file = harness.load();
        assert_eq!(file.get("T1").expect("T1").status, TaskStatus::Done);
        assert_eq!(file.get("T1").expect("T1").details, "finished first");
    }

    #[test]
    fn empty_task_id_applies_to_the_running_task() {
        let mut harness = Harness::new();
        harness.seed_tasks(&two_task_file());
        let agent = Arc::new(ScriptedAgent::new("codex"));
        agent.push_summary(scripted_summary("", "done", "anonymous summary"));
        harness.install("codex", agent.clone());

        let report = run_iteration(&harness.ctx(), 1)
            .expect("iteration runs")
            .expect("work existed");
        assert_eq!(report.task_id, "T1");
        assert_eq!(harness.load().get("T1").expect("T1").status, TaskStatus::Done);
    }

    #[test]
    fn mismatched_task_id_is_discarded() {
        let mut harness = Harness::new();
        harness.seed_tasks(&two_task_file());
        let agent = Arc::new(ScriptedAgent::new("codex"));
        agent.push_summary(scripted_summary("T2", "done", "worked on the wrong task"));
        harness.install("codex", agent.clone());

        let report = run_iteration(&harness.ctx(), 1)
            .expect("iteration runs")
            .expect("work existed");
        assert_eq!(
            report.disposition,
            Disposition::Mismatch {
                reported: "T2".to_string()
            }
        );
        let file = harness.load();
        // The running task keeps its doing mark; nothing else moved.
        assert_eq!(file.get("T1").expect("T1").status, TaskStatus::Doing);
        assert_eq!(file.get("T2").expect("T2").status, TaskStatus::Todo);
        assert!(harness.hook.fired().is_empty(), "hook must not fire on discard");
    }

    #[test]
    fn runner_failure_marks_the_task_blocked_and_halts() {
        let mut harness = Harness::new();
        harness.seed_tasks(&two_task_file());
        let agent = Arc::new(ScriptedAgent::new("codex"));
        agent.push_step(|_prompt| {
            Err(RunError::Exit {
                code: Some(1),
                parse_errors: Vec::new(),
            })
        });
        harness.install("codex", agent.clone());

        let err = run_iteration(&harness.ctx(), 1).expect_err("failure propagates");
        assert!(err.downcast_ref::<RunError>().is_some());
        assert_eq!(
            harness.load().get("T1").expect("T1").status,
            TaskStatus::Blocked
        );
    }

    #[test]
    fn timeout_marks_the_task_blocked() {
        let mut harness = Harness::new();
        harness.seed_tasks(&two_task_file());
        let agent = Arc::new(ScriptedAgent::new("codex"));
        agent.push_step(|_prompt| Err(RunError::Timeout { timeout_secs: 1 }));
        harness.install("codex", agent.clone());

        let err = run_iteration(&harness.ctx(), 1).expect_err("timeout propagates");
        assert!(matches!(
            err.downcast_ref::<RunError>(),
            Some(RunError::Timeout { timeout_secs: 1 })
        ));
        assert_eq!(
            harness.load().get("T1").expect("T1").status,
            TaskStatus::Blocked
        );
    }

    #[test]
    fn cancelled_run_leaves_the_task_doing() {
        let mut harness = Harness::new();
        harness.seed_tasks(&two_task_file());
        let agent = Arc::new(ScriptedAgent::new("codex"));
        agent.push_step(|_prompt| Err(RunError::Cancelled));
        harness.install("codex", agent.clone());

        let err = run_iteration(&harness.ctx(), 1).expect_err("cancel propagates");
        assert!(is_cancelled(&err));
        assert_eq!(
            harness.load().get("T1").expect("T1").status,
            TaskStatus::Doing
        );
    }

    #[test]
    fn skipped_summary_mutates_nothing_beyond_the_doing_mark() {
        let mut harness = Harness::new();
        harness.seed_tasks(&two_task_file());
        let agent = Arc::new(ScriptedAgent::new("codex"));
        agent.push_summary(scripted_summary("T1", "skipped", ""));
        harness.install("codex", agent.clone());

        let before = harness.load();
        let report = run_iteration(&harness.ctx(), 1)
            .expect("iteration runs")
            .expect("work existed");
        assert_eq!(report.disposition, Disposition::Applied(ApplyOutcome::Skipped));
        let after = harness.load();
        assert_eq!(after.get("T1").expect("T1").status, TaskStatus::Doing);
        assert_eq!(after.get("T1").expect("T1").details, before.get("T1").expect("T1").details);
        assert_eq!(after.get("T2"), before.get("T2"));
    }

    #[test]
    fn run_agent_writes_the_three_artifacts() {
        let mut harness = Harness::new();
        harness.seed_tasks(&two_task_file());
        let agent = Arc::new(ScriptedAgent::new("codex"));
        agent.push_summary(scripted_summary("T1", "done", "ok"));
        harness.install("codex", agent.clone());

        run_iteration(&harness.ctx(), 1).expect("iteration runs");

        let run_dir = harness.runs_dir().join("0001-iteration");
        assert!(run_dir.join("prompt.md").is_file());
        assert!(run_dir.join("events.jsonl").is_file());
        let meta: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(run_dir.join("meta.json")).expect("meta exists"),
        )
        .expect("meta is JSON");
        assert_eq!(meta["label"], "iteration");
        assert_eq!(meta["task_id"], "T1");
        assert_eq!(meta["agent"], "codex");
        assert_eq!(meta["result"], "summary (done)");
    }

    #[test]
    fn hook_fires_after_an_applied_summary() {
        let mut harness = Harness::new();
        harness.seed_tasks(&two_task_file());
        let agent = Arc::new(ScriptedAgent::new("codex"));
        agent.push_summary(scripted_summary("T1", "done", "ok"));
        harness.install("codex", agent.clone());

        run_iteration(&harness.ctx(), 1).expect("iteration runs");
        let fired = harness.hook.fired();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, "T1");
        assert_eq!(fired[0].1, "done");
        assert_eq!(fired[0].3, "iteration-1");
    }
}
