//! Loop configuration stored under `.taskmill/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::schedule::Schedule;

/// Timeout applied when an agent's `timeout_secs` is 0.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30 * 60;

/// Loop configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to a runnable single-agent setup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoopConfig {
    /// Task file the loop drives to completion.
    pub tasks_path: PathBuf,

    /// Hard cap on iterations per invocation.
    pub max_iterations: u32,

    /// Pause between iterations in seconds; 0 disables.
    pub iteration_delay_secs: u64,

    /// Agents for the fixed loop roles.
    pub bootstrap_agent: String,
    pub repair_agent: String,
    pub review_agent: String,

    /// Invoked after every iteration and review; empty disables.
    pub hook_command: Vec<String>,

    /// Schema resources; validation falls back to the minimal rules when a
    /// file is absent.
    pub tasks_schema_path: PathBuf,
    pub summary_schema_path: PathBuf,

    pub schedule: Schedule,

    /// Named agents referenced by the schedule and the fixed roles.
    pub agents: BTreeMap<String, AgentConfig>,
}

/// One agent backend invocation shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Registry key selecting the argv shape and wire format.
    pub backend: String,

    pub binary: String,

    /// Omitted from the argv when empty.
    pub model: String,
    pub reasoning: String,

    /// Extra arguments appended before the prompt.
    pub args: Vec<String>,

    /// 0 uses the 30 minute default; negative disables the deadline.
    pub timeout_secs: i64,

    pub workdir: PathBuf,

    /// Side-channel file for fallback summary recovery; empty disables.
    pub last_message_path: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            backend: "exec".to_string(),
            binary: "codex".to_string(),
            model: String::new(),
            reasoning: String::new(),
            args: Vec::new(),
            timeout_secs: 0,
            workdir: PathBuf::from("."),
            last_message_path: PathBuf::from(".taskmill/last_message.json"),
        }
    }
}

impl AgentConfig {
    pub fn effective_timeout(&self) -> Option<Duration> {
        match self.timeout_secs {
            secs if secs < 0 => None,
            0 => Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            secs => Some(Duration::from_secs(secs as u64)),
        }
    }

    pub fn last_message(&self) -> Option<&Path> {
        if self.last_message_path.as_os_str().is_empty() {
            None
        } else {
            Some(&self.last_message_path)
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        let mut agents = BTreeMap::new();
        agents.insert("codex".to_string(), AgentConfig::default());
        Self {
            tasks_path: PathBuf::from("tasks.json"),
            max_iterations: 50,
            iteration_delay_secs: 0,
            bootstrap_agent: "codex".to_string(),
            repair_agent: "codex".to_string(),
            review_agent: "codex".to_string(),
            hook_command: Vec::new(),
            tasks_schema_path: PathBuf::from(".taskmill/schemas/tasks.v1.schema.json"),
            summary_schema_path: PathBuf::from(".taskmill/schemas/summary.v1.schema.json"),
            schedule: Schedule::default(),
            agents,
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.tasks_path.as_os_str().is_empty() {
            return Err(anyhow!("tasks_path must not be empty"));
        }
        if let Schedule::RoundRobin { agents } = &self.schedule {
            if agents.is_empty() {
                return Err(anyhow!("schedule.agents must not be empty"));
            }
        }

        let mut referenced: Vec<&str> = vec![
            &self.bootstrap_agent,
            &self.repair_agent,
            &self.review_agent,
        ];
        referenced.extend(self.schedule.agent_names());
        for name in referenced {
            if name.is_empty() {
                return Err(anyhow!("agent roles and schedule entries must not be empty"));
            }
            if !self.agents.contains_key(name) {
                return Err(anyhow!("unknown agent {name:?} (no [agents.{name}] table)"));
            }
        }

        for (name, agent) in &self.agents {
            if agent.binary.trim().is_empty() {
                return Err(anyhow!("agents.{name}.binary must not be empty"));
            }
            if agent.backend.trim().is_empty() {
                return Err(anyhow!("agents.{name}.backend must not be empty"));
            }
        }
        Ok(())
    }

    pub fn iteration_delay(&self) -> Option<Duration> {
        if self.iteration_delay_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.iteration_delay_secs))
        }
    }

    pub fn hook_command(&self) -> Option<&[String]> {
        if self.hook_command.is_empty() {
            None
        } else {
            Some(&self.hook_command)
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `LoopConfig::default()`.
pub fn load_config(path: &Path) -> Result<LoopConfig> {
    if !path.exists() {
        let cfg = LoopConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: LoopConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &LoopConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, &buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
