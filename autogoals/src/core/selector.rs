//! Deterministic goal selection.

use crate::goal::Goal;
use crate::state::{ExecutionState, GoalState};

/// True iff every dependency of `goal` is persisted as `completed`.
///
/// A dependency missing from the status map counts as not completed.
pub fn can_execute(goal: &Goal, state: &ExecutionState) -> bool {
    goal.dependencies
        .iter()
        .all(|dep| state.status_of(dep) == Some(GoalState::Completed))
}

/// Statuses the scheduler will hand to a worker.
pub fn is_active(status: GoalState) -> bool {
    matches!(
        status,
        GoalState::Pending | GoalState::ReadyForExecution | GoalState::ReadyForVerification
    )
}

/// First active, eligible goal in declaration order.
pub fn next_goal<'a>(goals: &'a [Goal], state: &ExecutionState) -> Option<&'a Goal> {
    goals.iter().find(|goal| {
        state.status_of(&goal.id).is_some_and(is_active) && can_execute(goal, state)
    })
}

/// Whether any goal still has work left: active (blocked or not) or
/// currently in progress.
pub fn has_pending_work(state: &ExecutionState) -> bool {
    state
        .goals_status
        .values()
        .any(|status| is_active(status.status) || status.status == GoalState::InProgress)
}

/// Why the scheduler has nothing to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedReport {
    /// Goals that reached `failed`.
    pub failed: Vec<String>,
    /// Active goals that can never become eligible without operator action.
    pub blocked: Vec<BlockedGoal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedGoal {
    pub id: String,
    /// Dependencies that are not completed.
    pub waiting_on: Vec<String>,
}

impl BlockedReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty()
    }
}

/// Summarize failed and blocked goals, in declaration order.
pub fn blocked_report(goals: &[Goal], state: &ExecutionState) -> BlockedReport {
    let mut failed = Vec::new();
    let mut blocked = Vec::new();
    for goal in goals {
        match state.status_of(&goal.id) {
            Some(GoalState::Failed) => failed.push(goal.id.clone()),
            Some(status) if is_active(status) && !can_execute(goal, state) => {
                let waiting_on = goal
                    .dependencies
                    .iter()
                    .filter(|dep| state.status_of(dep) != Some(GoalState::Completed))
                    .cloned()
                    .collect();
                blocked.push(BlockedGoal {
                    id: goal.id.clone(),
                    waiting_on,
                });
            }
            _ => {}
        }
    }
    BlockedReport { failed, blocked }
}
