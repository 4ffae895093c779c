//! Canonical paths under `.taskmill/` for a project root.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct StatePaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub runs_dir: PathBuf,
    pub schemas_dir: PathBuf,
    pub tasks_schema_path: PathBuf,
    pub summary_schema_path: PathBuf,
}

impl StatePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join(".taskmill");
        let schemas_dir = state_dir.join("schemas");
        Self {
            root,
            config_path: state_dir.join("config.toml"),
            runs_dir: state_dir.join("runs"),
            tasks_schema_path: schemas_dir.join("tasks.v1.schema.json"),
            summary_schema_path: schemas_dir.join("summary.v1.schema.json"),
            schemas_dir,
            state_dir,
        }
    }
}

/// Allocate the next run directory `runs/<NNNN>-<label>` and create it.
///
/// `NNNN` continues from the highest numeric prefix already present, so
/// restarted loops keep a single monotonic sequence without a counter file.
pub fn next_run_dir(runs_dir: &Path, label: &str) -> Result<PathBuf> {
    fs::create_dir_all(runs_dir)
        .with_context(|| format!("create runs directory {}", runs_dir.display()))?;
    let mut highest = 0u32;
    for entry in
        fs::read_dir(runs_dir).with_context(|| format!("read {}", runs_dir.display()))?
    {
        let entry = entry.with_context(|| format!("read entry in {}", runs_dir.display()))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some((prefix, _)) = name.split_once('-') {
            if let Ok(index) = prefix.parse::<u32>() {
                highest = highest.max(index);
            }
        }
    }
    let dir = runs_dir.join(format!("{:04}-{label}", highest + 1));
    fs::create_dir_all(&dir).with_context(|| format!("create run directory {}", dir.display()))?;
    Ok(dir)
}
