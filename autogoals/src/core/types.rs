//! Shared deterministic types for scheduler core logic.
//!
//! These types define the contract between the scheduler and the external
//! worker. They carry no I/O handles.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::state::GoalState;

/// Worker phase. Every phase is the same external call with a different intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Planning,
    Execution,
    Verification,
}

impl Phase {
    /// The phase a goal in `state` is waiting on, if any.
    ///
    /// `in_progress` maps to execution so an interrupted attempt is resumed
    /// rather than skipped.
    pub fn for_state(state: GoalState) -> Option<Phase> {
        match state {
            GoalState::Pending => Some(Phase::Planning),
            GoalState::ReadyForExecution | GoalState::InProgress => Some(Phase::Execution),
            GoalState::ReadyForVerification => Some(Phase::Verification),
            GoalState::Completed | GoalState::Failed => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Planning => "planning",
            Phase::Execution => "execution",
            Phase::Verification => "verification",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Captured result of one command run by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: String,
    /// `None` when the process was killed (timeout) or never produced a code.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    #[serde(default)]
    pub timed_out: bool,
}

impl CommandResult {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// What the worker reports back for a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub success: bool,
    /// Commands run during the phase, in order. Verification reports carry one
    /// entry per verification command that was attempted.
    pub commands: Vec<CommandResult>,
}

impl WorkerReport {
    pub fn success(commands: Vec<CommandResult>) -> Self {
        Self {
            success: true,
            commands,
        }
    }

    pub fn failure(commands: Vec<CommandResult>) -> Self {
        Self {
            success: false,
            commands,
        }
    }

    /// First command that did not succeed, falling back to the last command.
    pub fn first_failure(&self) -> Option<&CommandResult> {
        self.commands
            .iter()
            .find(|result| !result.succeeded())
            .or_else(|| self.commands.last())
    }
}
