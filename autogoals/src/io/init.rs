//! Canonical `.autogoals/` paths and `autogoals init` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::info;

use super::config::{RunnerConfig, write_config};
use crate::goal::SAMPLE_GOALS_YAML;

/// All canonical paths for a project root.
#[derive(Debug, Clone)]
pub struct AutogoalsPaths {
    pub root: PathBuf,
    pub dir: PathBuf,
    pub goals_path: PathBuf,
    pub state_path: PathBuf,
    pub backup_path: PathBuf,
    pub config_path: PathBuf,
    pub logs_dir: PathBuf,
    pub pause_path: PathBuf,
    pub gitignore_path: PathBuf,
}

impl AutogoalsPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let dir = root.join(".autogoals");
        Self {
            goals_path: root.join("goals.yaml"),
            state_path: dir.join("execution_state.json"),
            backup_path: dir.join("execution_state.json.bak"),
            config_path: dir.join("config.toml"),
            logs_dir: dir.join("logs"),
            pause_path: dir.join("PAUSE"),
            gitignore_path: dir.join(".gitignore"),
            dir,
            root,
        }
    }

    /// Use a goal file other than `<root>/goals.yaml`.
    pub fn with_goals_path(mut self, goals_path: impl Into<PathBuf>) -> Self {
        self.goals_path = goals_path.into();
        self
    }

    pub fn goal_log_dir(&self, goal_id: &str) -> PathBuf {
        self.logs_dir.join(goal_id)
    }
}

/// Options for `init_project`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing autogoals-owned files.
    pub force: bool,
}

/// What `init_project` wrote.
#[derive(Debug, Clone)]
pub struct InitOutcome {
    pub paths: AutogoalsPaths,
    pub wrote_goals: bool,
}

/// Create `.autogoals/` scaffolding and a sample goal file in `root`.
///
/// An existing `goals.yaml` is never overwritten; `.autogoals/config.toml`
/// is only rewritten with `options.force`.
pub fn init_project(paths: &AutogoalsPaths, options: &InitOptions) -> Result<InitOutcome> {
    if paths.dir.exists() && !paths.dir.is_dir() {
        return Err(anyhow!(
            "autogoals init: {} exists but is not a directory",
            paths.dir.display()
        ));
    }
    if paths.config_path.exists() && !options.force {
        return Err(anyhow!(
            "autogoals init: {} already exists (use --force to overwrite)",
            paths.config_path.display()
        ));
    }

    create_dir(&paths.dir)?;
    create_dir(&paths.logs_dir)?;
    write_file(&paths.gitignore_path, AUTOGOALS_GITIGNORE)?;
    write_config(&paths.config_path, &RunnerConfig::default())?;

    let wrote_goals = !paths.goals_path.exists();
    if wrote_goals {
        write_file(&paths.goals_path, SAMPLE_GOALS_YAML)?;
    }
    info!(root = %paths.root.display(), wrote_goals, "initialized project");

    Ok(InitOutcome {
        paths: paths.clone(),
        wrote_goals,
    })
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))
}

const AUTOGOALS_GITIGNORE: &str = "logs/\nPAUSE\n*.tmp\n";
