//! Agent task loop CLI.
//!
//! Drives a flat JSON task file (`tasks.json`) to completion by repeatedly
//! invoking configured coding-agent CLIs. `taskmill run` executes the full
//! loop (bootstrap, iterate, review); `step` runs a single iteration.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use signal_hook::consts::SIGINT;
use signal_hook::flag;

use taskmill::cancel::CancelToken;
use taskmill::core::merge::ApplyOutcome;
use taskmill::exit_codes;
use taskmill::io::agent::{Agent, BackendRegistry};
use taskmill::io::config::{self, LoopConfig};
use taskmill::io::hook::CommandHook;
use taskmill::io::paths::StatePaths;
use taskmill::io::prompt::PromptEngine;
use taskmill::io::schema::{self, SchemaKind};
use taskmill::logging;
use taskmill::looping::{self, LoopStop};
use taskmill::step::{self, Disposition, IterationReport, StepContext};

const TASKS_SCHEMA: &str = include_str!("../../schemas/tasks/v1.schema.json");
const SUMMARY_SCHEMA: &str = include_str!("../../schemas/summary/v1.schema.json");

#[derive(Parser)]
#[command(name = "taskmill", version, about = "Agent task loop over a flat JSON task file")]
struct Cli {
    /// Config file.
    #[arg(long, global = true, default_value = ".taskmill/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.taskmill/config.toml` and schema files.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Check the task file against the schema and semantic rules.
    Validate,
    /// Run exactly one iteration (no bootstrap, no review).
    Step,
    /// Run the loop until the project is done or a stop condition hits.
    Run,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::ERROR
        }
    };
    std::process::exit(code);
}

fn run(cli: &Cli) -> Result<i32> {
    match &cli.command {
        Command::Init { force } => cmd_init(&cli.config, *force),
        Command::Validate => cmd_validate(&cli.config),
        Command::Step => cmd_step(&cli.config),
        Command::Run => cmd_run(&cli.config),
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    let paths = StatePaths::new(".");
    if config_path.exists() && !force {
        bail!(
            "{} already exists (pass --force to overwrite)",
            config_path.display()
        );
    }
    config::write_config(config_path, &LoopConfig::default())?;
    write_if_missing_or_force(&paths.tasks_schema_path, TASKS_SCHEMA, force)?;
    write_if_missing_or_force(&paths.summary_schema_path, SUMMARY_SCHEMA, force)?;
    println!("initialized {}", paths.state_dir.display());
    Ok(exit_codes::OK)
}

fn write_if_missing_or_force(path: &Path, contents: &str, force: bool) -> Result<()> {
    if !force && path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<i32> {
    let config = config::load_config(config_path)?;
    let raw = fs::read_to_string(&config.tasks_path)
        .with_context(|| format!("read {}", config.tasks_path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("parse {}", config.tasks_path.display()))?;
    let issues = schema::validate_value(&value, &config.tasks_schema_path, SchemaKind::Tasks);
    if issues.is_empty() {
        println!("{} is valid", config.tasks_path.display());
        return Ok(exit_codes::OK);
    }
    for issue in &issues {
        eprintln!("{issue}");
    }
    Ok(exit_codes::ERROR)
}

fn cmd_step(config_path: &Path) -> Result<i32> {
    let wiring = Wiring::assemble(config_path)?;
    match step::run_iteration(&wiring.ctx(), 1) {
        Ok(Some(report)) => {
            println!("{}", describe(&report));
            Ok(exit_codes::OK)
        }
        Ok(None) => {
            println!("no todo tasks");
            Ok(exit_codes::OK)
        }
        Err(err) if step::is_cancelled(&err) => Ok(exit_codes::INTERRUPTED),
        Err(err) => Err(err),
    }
}

fn cmd_run(config_path: &Path) -> Result<i32> {
    let wiring = Wiring::assemble(config_path)?;
    let outcome = looping::run_loop(&wiring.ctx())?;
    Ok(match outcome.stop {
        LoopStop::Done => {
            println!("project done after {} iterations", outcome.iterations);
            exit_codes::OK
        }
        LoopStop::MaxIterations { limit } => {
            eprintln!("stopped at the iteration ceiling ({limit})");
            exit_codes::MAX_ITERATIONS
        }
        LoopStop::Cancelled => {
            eprintln!("interrupted after {} iterations", outcome.iterations);
            exit_codes::INTERRUPTED
        }
    })
}

/// Everything a [`StepContext`] borrows, built once per command.
struct Wiring {
    config: LoopConfig,
    runs_dir: PathBuf,
    engine: PromptEngine,
    agents: BTreeMap<String, Box<dyn Agent>>,
    hook: CommandHook,
    cancel: CancelToken,
}

impl Wiring {
    fn assemble(config_path: &Path) -> Result<Self> {
        let config = config::load_config(config_path)?;
        let paths = StatePaths::new(".");
        let agents = BackendRegistry::builtin().build_all(&config.agents)?;
        let hook = CommandHook::new(config.hook_command().unwrap_or_default());
        let engine = PromptEngine::new()?;
        let cancel = CancelToken::new();
        flag::register(SIGINT, cancel.as_flag()).context("install SIGINT handler")?;
        Ok(Self {
            config,
            runs_dir: paths.runs_dir,
            engine,
            agents,
            hook,
            cancel,
        })
    }

    fn ctx(&self) -> StepContext<'_> {
        StepContext {
            config: &self.config,
            runs_dir: &self.runs_dir,
            engine: &self.engine,
            agents: &self.agents,
            hook: &self.hook,
            cancel: &self.cancel,
        }
    }
}

fn describe(report: &IterationReport) -> String {
    match &report.disposition {
        Disposition::Applied(ApplyOutcome::Updated { id }) => {
            format!("task {} updated ({})", id, report.status)
        }
        Disposition::Applied(ApplyOutcome::Created { id }) => {
            format!("task {} created ({})", id, report.status)
        }
        Disposition::Applied(ApplyOutcome::Skipped) => {
            format!("task {} left unchanged (agent skipped)", report.task_id)
        }
        Disposition::Mismatch { reported } => format!(
            "task {} unchanged (summary named '{}')",
            report.task_id, reported
        ),
        Disposition::Invalid { issues } => format!(
            "task {} unchanged (summary invalid: {})",
            report.task_id,
            issues.join("; ")
        ),
    }
}
