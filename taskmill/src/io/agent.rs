//! Agent backends and the registry that wires configuration to them.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Result, bail};

use crate::cancel::CancelToken;
use crate::core::protocol::WireFormat;
use crate::core::summary::Summary;
use crate::io::config::AgentConfig;
use crate::io::events::SharedSink;
use crate::io::runner::{self, Invocation, RunError};

/// One configured agent, ready to run prompts.
pub trait Agent: Send {
    fn name(&self) -> &str;
    fn run(
        &self,
        prompt: &str,
        sink: &SharedSink,
        cancel: &CancelToken,
    ) -> Result<Summary, RunError>;
}

impl std::fmt::Debug for dyn Agent + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent").field("name", &self.name()).finish()
    }
}

/// Builds an agent from its configured name and settings.
pub type AgentFactory = fn(&str, &AgentConfig) -> Box<dyn Agent>;

/// Maps backend kinds to constructors. `builtin` seeds the two wire formats;
/// further kinds register at startup, so an unknown `backend` key fails at
/// wire-up instead of deep inside a run.
pub struct BackendRegistry {
    factories: BTreeMap<String, AgentFactory>,
}

impl BackendRegistry {
    pub fn builtin() -> Self {
        let mut registry = Self {
            factories: BTreeMap::new(),
        };
        registry.register("exec", |name, config| {
            Box::new(CliAgent::new(name, config.clone(), WireFormat::Exec))
        });
        registry.register("stream", |name, config| {
            Box::new(CliAgent::new(name, config.clone(), WireFormat::Stream))
        });
        registry
    }

    pub fn register(&mut self, kind: &str, factory: AgentFactory) {
        self.factories.insert(kind.to_string(), factory);
    }

    pub fn build(&self, name: &str, config: &AgentConfig) -> Result<Box<dyn Agent>> {
        match self.factories.get(&config.backend) {
            Some(factory) => Ok(factory(name, config)),
            None => bail!(
                "agent '{name}' uses unknown backend '{}' (known: {})",
                config.backend,
                self.kinds().join(", ")
            ),
        }
    }

    /// Build every configured agent up front.
    pub fn build_all(
        &self,
        agents: &BTreeMap<String, AgentConfig>,
    ) -> Result<BTreeMap<String, Box<dyn Agent>>> {
        let mut built = BTreeMap::new();
        for (name, config) in agents {
            built.insert(name.clone(), self.build(name, config)?);
        }
        Ok(built)
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

/// Command-line agent speaking one of the two wire formats. The prompt goes
/// last on the command line; stdin stays closed.
pub struct CliAgent {
    name: String,
    config: AgentConfig,
    format: WireFormat,
}

impl CliAgent {
    pub fn new(name: &str, config: AgentConfig, format: WireFormat) -> Self {
        Self {
            name: name.to_string(),
            config,
            format,
        }
    }

    fn argv(&self, prompt: &str) -> Vec<String> {
        let mut argv = vec![self.config.binary.clone()];
        match self.format {
            WireFormat::Exec => {
                argv.extend(["exec", "--json", "--skip-git-repo-check"].map(str::to_string));
                if !self.config.model.is_empty() {
                    argv.push("--model".to_string());
                    argv.push(self.config.model.clone());
                }
                if !self.config.reasoning.is_empty() {
                    argv.push("-c".to_string());
                    argv.push(format!("model_reasoning_effort={}", self.config.reasoning));
                }
                if let Some(path) = self.config.last_message() {
                    argv.push("--output-last-message".to_string());
                    argv.push(path.display().to_string());
                }
            }
            WireFormat::Stream => {
                argv.extend(
                    [
                        "-p",
                        "--verbose",
                        "--output-format",
                        "stream-json",
                        "--dangerously-skip-permissions",
                    ]
                    .map(str::to_string),
                );
                if !self.config.model.is_empty() {
                    argv.push("--model".to_string());
                    argv.push(self.config.model.clone());
                }
            }
        }
        argv.extend(self.config.args.iter().cloned());
        argv.push(prompt.to_string());
        argv
    }

    fn invocation(&self, prompt: &str) -> Invocation {
        let workdir = if self.config.workdir.as_os_str().is_empty() {
            None
        } else {
            Some(self.config.workdir.clone())
        };
        Invocation {
            argv: self.argv(prompt),
            workdir,
            timeout: self.config.effective_timeout(),
            format: self.format,
            last_message: self.config.last_message().map(Path::to_path_buf),
        }
    }
}

impl Agent for CliAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(
        &self,
        prompt: &str,
        sink: &SharedSink,
        cancel: &CancelToken,
    ) -> Result<Summary, RunError> {
        runner::execute(&self.invocation(prompt), sink, cancel)
    }
}
