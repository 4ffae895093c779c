//! Task-file load, validation, and one-shot repair.

use std::fs;

use anyhow::{Context, Result, bail};
use tracing::warn;

use crate::core::task::TaskFile;
use crate::io::store;
use crate::step::{self, StepContext};

/// Load the task file, repairing once through the repair agent when the
/// first load fails parsing or validation. A second failure is fatal and
/// reports both error sets.
pub fn load_with_repair(ctx: &StepContext) -> Result<TaskFile> {
    let first_err = match store::load_tasks(&ctx.config.tasks_path, &ctx.config.tasks_schema_path) {
        Ok(file) => return Ok(file),
        Err(err) if err.is_missing() => {
            return Err(err).with_context(|| {
                format!("task file {} does not exist", ctx.config.tasks_path.display())
            });
        }
        Err(err) => err,
    };

    let first = first_err.issues();
    warn!(
        "task file invalid ({} issues), asking {} to repair",
        first.len(),
        ctx.config.repair_agent
    );
    repair(ctx, &first)?;

    match store::load_tasks(&ctx.config.tasks_path, &ctx.config.tasks_schema_path) {
        Ok(file) => Ok(file),
        Err(second_err) => {
            let second = second_err.issues();
            bail!(
                "task file {} is still invalid after repair; before repair: {}; after repair: {}",
                ctx.config.tasks_path.display(),
                first.join("; "),
                second.join("; ")
            )
        }
    }
}

fn repair(ctx: &StepContext, issues: &[String]) -> Result<()> {
    if ctx.cancel.is_cancelled() {
        return Err(step::cancelled_error());
    }
    let raw = fs::read_to_string(&ctx.config.tasks_path).unwrap_or_default();
    let prompt = ctx.engine.repair_prompt(&ctx.config.tasks_path, issues, &raw)?;
    let agent = ctx.agent(&ctx.config.repair_agent)?;
    match step::run_agent(ctx, "repair", "", agent, &prompt) {
        Ok(_) => Ok(()),
        Err(err) if step::is_cancelled(&err) => Err(err),
        Err(err) => {
            // The reload decides whether the repair worked; a noisy agent
            // exit alone does not.
            warn!("repair agent reported failure: {err:#}");
            Ok(())
        }
    }
}
