//! Persisted execution state (`.autogoals/execution_state.json`).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::goal::Goal;

pub const STATE_VERSION: u32 = 1;

/// Lifecycle status of a single goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalState {
    Pending,
    ReadyForExecution,
    #[serde(alias = "executing")]
    InProgress,
    ReadyForVerification,
    Completed,
    Failed,
}

impl GoalState {
    pub fn as_str(self) -> &'static str {
        match self {
            GoalState::Pending => "pending",
            GoalState::ReadyForExecution => "ready_for_execution",
            GoalState::InProgress => "in_progress",
            GoalState::ReadyForVerification => "ready_for_verification",
            GoalState::Completed => "completed",
            GoalState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, GoalState::Completed | GoalState::Failed)
    }
}

impl fmt::Display for GoalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure context carried to the next attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    pub command: String,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timestamp: DateTime<Utc>,
}

/// Mutable half of a goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalStatus {
    pub status: GoalState,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<LastError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl GoalStatus {
    pub fn pending() -> Self {
        Self {
            status: GoalState::Pending,
            retry_count: 0,
            last_error: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Label for human output. A goal sent back for another execution
    /// attempt shows as `retrying`; the stored state is unchanged.
    pub fn display_label(&self) -> &'static str {
        if self.status == GoalState::ReadyForExecution && self.retry_count > 0 {
            "retrying"
        } else {
            self.status.as_str()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PhaseStarted,
    PhaseSucceeded,
    PhaseFailed,
    RetryScheduled,
    GoalCompleted,
    GoalFailed,
    GoalTimedOut,
    GoalSkipped,
    GoalReset,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub goal_id: String,
    pub event: EventKind,
    pub message: String,
}

/// The full persisted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub version: u32,
    #[serde(default)]
    pub current_goal_id: Option<String>,
    pub goals_status: BTreeMap<String, GoalStatus>,
    #[serde(default)]
    pub execution_log: Vec<LogEvent>,
}

impl ExecutionState {
    /// Fresh state with every goal pending.
    pub fn initialize(goals: &[Goal]) -> Self {
        Self {
            version: STATE_VERSION,
            current_goal_id: None,
            goals_status: goals
                .iter()
                .map(|goal| (goal.id.clone(), GoalStatus::pending()))
                .collect(),
            execution_log: Vec::new(),
        }
    }

    pub fn status_of(&self, goal_id: &str) -> Option<GoalState> {
        self.goals_status.get(goal_id).map(|status| status.status)
    }

    /// Append to the log. The log is never rewritten.
    pub fn record(
        &mut self,
        timestamp: DateTime<Utc>,
        goal_id: &str,
        event: EventKind,
        message: impl Into<String>,
    ) {
        self.execution_log.push(LogEvent {
            timestamp,
            goal_id: goal_id.to_string(),
            event,
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::goal;

    #[test]
    fn executing_is_accepted_as_in_progress() {
        let parsed: GoalState = serde_json::from_str("\"executing\"").expect("parse");
        assert_eq!(parsed, GoalState::InProgress);
        assert_eq!(
            serde_json::to_string(&parsed).expect("serialize"),
            "\"in_progress\""
        );
    }

    #[test]
    fn retrying_is_display_only() {
        let mut status = GoalStatus::pending();
        status.status = GoalState::ReadyForExecution;
        assert_eq!(status.display_label(), "ready_for_execution");
        status.retry_count = 1;
        assert_eq!(status.display_label(), "retrying");
        assert_eq!(status.status, GoalState::ReadyForExecution);
    }

    #[test]
    fn initialize_marks_every_goal_pending() {
        let goals = vec![goal("a", &[]), goal("b", &["a"])];
        let state = ExecutionState::initialize(&goals);
        assert_eq!(state.version, STATE_VERSION);
        assert_eq!(state.goals_status.len(), 2);
        assert!(
            state
                .goals_status
                .values()
                .all(|status| status.status == GoalState::Pending)
        );
        assert!(state.execution_log.is_empty());
    }
}
