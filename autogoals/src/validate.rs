//! Project loading: goal file, dependency graph, and runner config.
//!
//! Every command starts here. Nothing in this module writes to disk, so a
//! validation failure never touches the execution state.

use anyhow::Result;
use tracing::{debug, instrument};

use crate::core::dependency::validate_dependencies;
use crate::error::ConfigurationError;
use crate::goal::{Goal, GoalsFile};
use crate::io::config::{RunnerConfig, load_config};
use crate::io::goals_file::load_goals;
use crate::io::init::AutogoalsPaths;

/// A validated project ready for scheduling.
#[derive(Debug, Clone)]
pub struct Project {
    pub paths: AutogoalsPaths,
    pub goals_file: GoalsFile,
    /// Dependency-respecting execution order.
    pub order: Vec<String>,
    pub config: RunnerConfig,
}

impl Project {
    pub fn goals(&self) -> &[Goal] {
        &self.goals_file.goals
    }

    pub fn goal(&self, id: &str) -> Option<&Goal> {
        self.goals_file.find(id)
    }
}

/// Load the goal file, validate its dependency graph, and load the config.
#[instrument(skip_all, fields(goals = %paths.goals_path.display()))]
pub fn load_project(paths: &AutogoalsPaths) -> Result<Project> {
    let goals_file = load_goals(&paths.goals_path)?;
    let order = validate_dependencies(&goals_file.goals)?;
    let config = load_config(&paths.config_path)
        .map_err(|err| ConfigurationError::new(&paths.config_path, format!("{err:#}")))?;
    debug!(goals = order.len(), backend = ?config.backend.kind, "project loaded");
    Ok(Project {
        paths: paths.clone(),
        goals_file,
        order,
        config,
    })
}
