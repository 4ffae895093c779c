//! Prompt rendering for the four agent roles.

use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::task::{Task, TaskFile};

static BOOTSTRAP_TEMPLATE: &str = include_str!("prompts/bootstrap.md");
static ITERATION_TEMPLATE: &str = include_str!("prompts/iteration.md");
static REPAIR_TEMPLATE: &str = include_str!("prompts/repair.md");
static REVIEW_TEMPLATE: &str = include_str!("prompts/review.md");

pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("bootstrap", BOOTSTRAP_TEMPLATE)
            .context("add bootstrap template")?;
        env.add_template("iteration", ITERATION_TEMPLATE)
            .context("add iteration template")?;
        env.add_template("repair", REPAIR_TEMPLATE)
            .context("add repair template")?;
        env.add_template("review", REVIEW_TEMPLATE)
            .context("add review template")?;
        Ok(Self { env })
    }

    pub fn bootstrap_prompt(&self, tasks_path: &Path) -> Result<String> {
        let template = self.env.get_template("bootstrap").context("bootstrap template")?;
        template
            .render(context! { tasks_path => tasks_path.display().to_string() })
            .context("render bootstrap prompt")
    }

    pub fn iteration_prompt(&self, tasks_path: &Path, task: &Task) -> Result<String> {
        let template = self.env.get_template("iteration").context("iteration template")?;
        template
            .render(context! {
                tasks_path => tasks_path.display().to_string(),
                task => task,
            })
            .context("render iteration prompt")
    }

    pub fn repair_prompt(&self, tasks_path: &Path, issues: &[String], raw: &str) -> Result<String> {
        let template = self.env.get_template("repair").context("repair template")?;
        template
            .render(context! {
                tasks_path => tasks_path.display().to_string(),
                issues => issues,
                raw => raw,
            })
            .context("render repair prompt")
    }

    pub fn review_prompt(&self, tasks_path: &Path, file: &TaskFile) -> Result<String> {
        let tasks_json = serde_json::to_string_pretty(file).context("serialize task file")?;
        let template = self.env.get_template("review").context("review template")?;
        template
            .render(context! {
                tasks_path => tasks_path.display().to_string(),
                tasks_json => tasks_json,
            })
            .context("render review prompt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn engine() -> PromptEngine {
        PromptEngine::new().expect("templates compile")
    }

    #[test]
    fn bootstrap_names_the_target_path() {
        let prompt = engine()
            .bootstrap_prompt(&PathBuf::from("work/tasks.json"))
            .expect("render");
        assert!(prompt.contains("work/tasks.json"));
        assert!(prompt.contains("schema_version"));
    }

    #[test]
    fn iteration_includes_task_fields_and_summary_contract() {
        let mut task = Task::new("T3", "Wire up the parser", 2);
        task.details = "Connect lexer output to the parser entry point.".to_string();
        task.steps = vec!["read lexer.rs".to_string(), "add parse()".to_string()];
        let prompt = engine()
            .iteration_prompt(&PathBuf::from("tasks.json"), &task)
            .expect("render");
        assert!(prompt.contains("T3"));
        assert!(prompt.contains("Wire up the parser"));
        assert!(prompt.contains("read lexer.rs"));
        assert!(prompt.contains("\"task_id\""));
    }

    #[test]
    fn iteration_collapses_empty_sections() {
        let task = Task::new("T1", "Bare task", 3);
        let prompt = engine()
            .iteration_prompt(&PathBuf::from("tasks.json"), &task)
            .expect("render");
        assert!(!prompt.contains("Steps:"));
        assert!(!prompt.contains("Relevant files:"));
    }

    #[test]
    fn repair_lists_every_issue() {
        let issues = vec![
            "tasks[0].id: empty id".to_string(),
            "schema_version: must be 1".to_string(),
        ];
        let prompt = engine()
            .repair_prompt(&PathBuf::from("tasks.json"), &issues, "{\"broken\": true}")
            .expect("render");
        for issue in &issues {
            assert!(prompt.contains(issue), "missing {issue}");
        }
        assert!(prompt.contains("{\"broken\": true}"));
    }

    #[test]
    fn review_embeds_the_serialized_file() {
        let mut file = TaskFile::default();
        file.tasks.push(Task::new("T1", "Only task", 1));
        let prompt = engine()
            .review_prompt(&PathBuf::from("tasks.json"), &file)
            .expect("render");
        assert!(prompt.contains("Only task"));
    }
}
