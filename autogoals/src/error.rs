//! Typed failures that the CLI maps to exit codes.
//!
//! Everything else travels as plain `anyhow::Error` with context. These types
//! are recovered with `downcast_ref` at the command boundary.

use std::path::PathBuf;

use thiserror::Error;

/// The goal file could not be read, parsed, or fails structural checks.
#[derive(Debug, Error)]
#[error("invalid goal configuration {}: {reason}", path.display())]
pub struct ConfigurationError {
    pub path: PathBuf,
    pub reason: String,
}

impl ConfigurationError {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Reference-integrity problems in the declared goal graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    #[error("goal '{goal}' depends on unknown goal '{dependency}'")]
    UnknownDependency { goal: String, dependency: String },

    #[error("circular dependency: {}", path.join(" -> "))]
    CircularDependency { path: Vec<String> },
}

/// The persisted execution state cannot be trusted.
#[derive(Debug, Error)]
#[error("execution state {} is corrupt: {reason}", path.display())]
pub struct StateCorruptionError {
    pub path: PathBuf,
    pub reason: String,
    pub backup_available: bool,
}

impl StateCorruptionError {
    /// Operator guidance printed below the error.
    pub fn hint(&self) -> &'static str {
        if self.backup_available {
            "run `autogoals recover --from-backup` to restore the previous state, or `autogoals recover --reinitialize` to start over"
        } else {
            "no backup is available; run `autogoals recover --reinitialize` to start over"
        }
    }
}

/// An external tool (agent CLI, docker) is missing or unusable.
#[derive(Debug, Error)]
#[error("{tool} unavailable: {reason}")]
pub struct ExternalToolError {
    pub tool: String,
    pub reason: String,
    pub guidance: String,
}

impl ExternalToolError {
    pub fn new(
        tool: impl Into<String>,
        reason: impl Into<String>,
        guidance: impl Into<String>,
    ) -> Self {
        Self {
            tool: tool.into(),
            reason: reason.into(),
            guidance: guidance.into(),
        }
    }
}
