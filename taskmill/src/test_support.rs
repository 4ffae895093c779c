//! Scripted doubles and a filesystem harness for loop tests.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::cancel::CancelToken;
use crate::core::summary::Summary;
use crate::core::task::TaskFile;
use crate::io::agent::Agent;
use crate::io::config::LoopConfig;
use crate::io::events::SharedSink;
use crate::io::hook::HookRunner;
use crate::io::prompt::PromptEngine;
use crate::io::runner::RunError;
use crate::io::store;
use crate::step::StepContext;

/// Shorthand for a summary literal.
pub fn scripted_summary(task_id: &str, status: &str, text: &str) -> Summary {
    Summary {
        task_id: task_id.to_string(),
        status: status.to_string(),
        summary: text.to_string(),
        files: Vec::new(),
        blockers: Vec::new(),
    }
}

type ScriptStep = Box<dyn FnOnce(&str) -> Result<Summary, RunError> + Send>;

/// Agent double that replays queued steps in order. Each step sees the
/// rendered prompt, so it can assert on it or produce filesystem side
/// effects the way a real agent would.
pub struct ScriptedAgent {
    name: String,
    steps: Mutex<VecDeque<ScriptStep>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedAgent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            steps: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn push_summary(&self, summary: Summary) {
        self.push_step(move |_prompt| Ok(summary));
    }

    pub fn push_step(&self, step: impl FnOnce(&str) -> Result<Summary, RunError> + Send + 'static) {
        self.steps
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push_back(Box::new(step));
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .len()
    }
}

impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(
        &self,
        prompt: &str,
        _sink: &SharedSink,
        _cancel: &CancelToken,
    ) -> Result<Summary, RunError> {
        self.prompts
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push(prompt.to_string());
        let step = self
            .steps
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .pop_front()
            .unwrap_or_else(|| panic!("scripted agent '{}' ran out of steps", self.name));
        step(prompt)
    }
}

impl Agent for Arc<ScriptedAgent> {
    fn name(&self) -> &str {
        self.as_ref().name()
    }

    fn run(
        &self,
        prompt: &str,
        sink: &SharedSink,
        cancel: &CancelToken,
    ) -> Result<Summary, RunError> {
        self.as_ref().run(prompt, sink, cancel)
    }
}

/// Hook double recording every fire.
#[derive(Default)]
pub struct ScriptedHook {
    fired: Mutex<Vec<(String, String, PathBuf, String)>>,
}

impl ScriptedHook {
    pub fn fired(&self) -> Vec<(String, String, PathBuf, String)> {
        self.fired
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }
}

impl HookRunner for ScriptedHook {
    fn fire(&self, task_id: &str, status: &str, last_message: &Path, label: &str) {
        self.fired.lock().unwrap_or_else(|err| err.into_inner()).push((
            task_id.to_string(),
            status.to_string(),
            last_message.to_path_buf(),
            label.to_string(),
        ));
    }
}

/// Temp-directory fixture wiring a complete `StepContext`.
pub struct Harness {
    pub config: LoopConfig,
    pub engine: PromptEngine,
    pub agents: BTreeMap<String, Box<dyn Agent>>,
    pub hook: ScriptedHook,
    pub cancel: CancelToken,
    runs_dir: PathBuf,
    _temp: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        let mut config = LoopConfig {
            tasks_path: root.join("tasks.json"),
            tasks_schema_path: root.join("schemas/tasks.v1.schema.json"),
            summary_schema_path: root.join("schemas/summary.v1.schema.json"),
            ..LoopConfig::default()
        };
        if let Some(agent) = config.agents.get_mut("codex") {
            agent.last_message_path = root.join("last_message.json");
        }
        Self {
            config,
            engine: PromptEngine::new().expect("templates compile"),
            agents: BTreeMap::new(),
            hook: ScriptedHook::default(),
            cancel: CancelToken::new(),
            runs_dir: root.join("runs"),
            _temp: temp,
        }
    }

    pub fn install(&mut self, name: &str, agent: Arc<ScriptedAgent>) {
        self.agents.insert(name.to_string(), Box::new(agent));
    }

    pub fn ctx(&self) -> StepContext<'_> {
        StepContext {
            config: &self.config,
            runs_dir: &self.runs_dir,
            engine: &self.engine,
            agents: &self.agents,
            hook: &self.hook,
            cancel: &self.cancel,
        }
    }

    pub fn root(&self) -> &Path {
        self._temp.path()
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    pub fn seed_tasks(&self, file: &TaskFile) {
        store::save_tasks(&self.config.tasks_path, file).expect("seed tasks");
    }

    pub fn load(&self) -> TaskFile {
        store::load_tasks(&self.config.tasks_path, &self.config.tasks_schema_path)
            .expect("load tasks")
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
