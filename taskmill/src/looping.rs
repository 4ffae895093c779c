//! The outer loop: bootstrap, iterate, review, stop.

use std::fs;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tracing::{error, info, instrument, warn};

use crate::core::merge::{self, ApplyOutcome};
use crate::core::task::PROJECT_DONE_ID;
use crate::io::schema::{self, SchemaKind};
use crate::io::store;
use crate::step::{self, StepContext};
use crate::validate;

/// One wait slice of the cancellable inter-iteration delay.
const DELAY_SLICE: Duration = Duration::from_millis(200);

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// Every task finished and review added nothing.
    Done,
    /// The iteration ceiling was reached.
    MaxIterations { limit: u32 },
    /// Cancelled from outside; disk reflects the last completed step.
    Cancelled,
}

#[derive(Debug)]
pub struct LoopOutcome {
    pub stop: LoopStop,
    pub iterations: u32,
}

#[instrument(skip_all)]
pub fn run_loop(ctx: &StepContext) -> Result<LoopOutcome> {
    let mut iterations = 0u32;
    let cancelled = |iterations: u32| LoopOutcome {
        stop: LoopStop::Cancelled,
        iterations,
    };

    match ensure_task_file(ctx) {
        Ok(()) => {}
        Err(err) if step::is_cancelled(&err) => return Ok(cancelled(0)),
        Err(err) => return Err(err),
    }

    // Iterations reload before selecting; this pass catches an unusable
    // file before any task is touched.
    match validate::load_with_repair(ctx) {
        Ok(_) => {}
        Err(err) if step::is_cancelled(&err) => return Ok(cancelled(0)),
        Err(err) => return Err(err),
    }

    loop {
        if ctx.cancel.is_cancelled() {
            return Ok(cancelled(iterations));
        }
        if iterations >= ctx.config.max_iterations {
            info!("iteration ceiling {} reached", ctx.config.max_iterations);
            return Ok(LoopOutcome {
                stop: LoopStop::MaxIterations {
                    limit: ctx.config.max_iterations,
                },
                iterations,
            });
        }

        match step::run_iteration(ctx, iterations + 1) {
            Ok(Some(report)) => {
                iterations += 1;
                info!(
                    "iteration {iterations} finished: task {} reported '{}'",
                    report.task_id, report.status
                );
                pause_between(ctx);
            }
            Ok(None) => match review_phase(ctx, iterations) {
                Ok(ReviewVerdict::WorkRemains) => {}
                Ok(ReviewVerdict::ProjectDone) => {
                    return Ok(LoopOutcome {
                        stop: LoopStop::Done,
                        iterations,
                    });
                }
                Err(err) if step::is_cancelled(&err) => return Ok(cancelled(iterations)),
                Err(err) => return Err(err),
            },
            Err(err) if step::is_cancelled(&err) => return Ok(cancelled(iterations)),
            Err(err) => return Err(err),
        }
    }
}

/// Bootstrap when the task file is missing. The file on disk decides whether
/// bootstrap worked; the agent's own exit only gets a warning.
fn ensure_task_file(ctx: &StepContext) -> Result<()> {
    let path = &ctx.config.tasks_path;
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => return Ok(()),
        Ok(_) => bail!("{} exists but is not a regular file", path.display()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err).with_context(|| format!("stat {}", path.display())),
    }

    info!(
        "no task file at {}, bootstrapping via {}",
        path.display(),
        ctx.config.bootstrap_agent
    );
    if ctx.cancel.is_cancelled() {
        return Err(step::cancelled_error());
    }
    let prompt = ctx.engine.bootstrap_prompt(path)?;
    let agent = ctx.agent(&ctx.config.bootstrap_agent)?;
    match step::run_agent(ctx, "bootstrap", "", agent, &prompt) {
        Ok(_) => {}
        Err(err) if step::is_cancelled(&err) => return Err(err),
        Err(err) => warn!("bootstrap agent reported failure: {err:#}"),
    }
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => bail!("bootstrap left {} as a directory", path.display()),
        Err(_) => bail!("bootstrap did not create {}", path.display()),
    }
}

enum ReviewVerdict {
    WorkRemains,
    ProjectDone,
}

fn review_phase(ctx: &StepContext, iterations: u32) -> Result<ReviewVerdict> {
    if ctx.cancel.is_cancelled() {
        return Err(step::cancelled_error());
    }
    let file = validate::load_with_repair(ctx)?;
    info!("no todo tasks left, reviewing via {}", ctx.config.review_agent);
    let prompt = ctx.engine.review_prompt(&ctx.config.tasks_path, &file)?;
    let agent = ctx.agent(&ctx.config.review_agent)?;
    let summary = step::run_agent(ctx, "review", "", agent, &prompt)?;

    // Review agents add work by editing the file; reload to see it.
    let mut file = validate::load_with_repair(ctx)?;
    let value = serde_json::to_value(&summary).context("serialize summary")?;
    let issues = schema::validate_value(&value, &ctx.config.summary_schema_path, SchemaKind::Summary);
    if issues.is_empty() {
        let outcome = merge::apply_summary(&mut file, &summary.task_id, &summary);
        if outcome != ApplyOutcome::Skipped {
            store::save_tasks(&ctx.config.tasks_path, &file)?;
        }
    } else {
        error!("review summary failed validation: {}", issues.join("; "));
    }
    ctx.hook.fire(
        &summary.task_id,
        &summary.status,
        &ctx.last_message_for(&ctx.config.review_agent),
        &format!("review-{iterations}"),
    );

    if file.first_todo().is_some() {
        info!("review added work, continuing");
        return Ok(ReviewVerdict::WorkRemains);
    }
    if file.append_project_done() {
        store::save_tasks(&ctx.config.tasks_path, &file)?;
        info!("appended {PROJECT_DONE_ID} marker");
    }
    Ok(ReviewVerdict::ProjectDone)
}

fn pause_between(ctx: &StepContext) {
    if ctx.config.iteration_delay_secs == 0 {
        return;
    }
    let deadline = Instant::now() + Duration::from_secs(ctx.config.iteration_delay_secs);
    while !ctx.cancel.is_cancelled() {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(DELAY_SLICE));
    }
}
