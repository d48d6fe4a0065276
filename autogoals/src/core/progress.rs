//! Progress counters for status output.

use crate::goal::Goal;
use crate::state::{ExecutionState, GoalState};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub in_flight: usize,
    pub pending: usize,
    pub failed: usize,
}

impl Progress {
    /// Share of goals completed, in whole percent. An empty run is complete.
    pub fn percent_complete(&self) -> u32 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed * 100) / self.total) as u32
    }
}

/// Count goal statuses over the declared goals.
pub fn progress(goals: &[Goal], state: &ExecutionState) -> Progress {
    let mut out = Progress {
        total: goals.len(),
        ..Progress::default()
    };
    for goal in goals {
        match state.status_of(&goal.id) {
            Some(GoalState::Completed) => out.completed += 1,
            Some(GoalState::Failed) => out.failed += 1,
            Some(
                GoalState::ReadyForExecution
                | GoalState::InProgress
                | GoalState::ReadyForVerification,
            ) => out.in_flight += 1,
            Some(GoalState::Pending) | None => out.pending += 1,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{goal, state_with};

    #[test]
    fn counts_and_percentage() {
        let goals = vec![goal("a", &[]), goal("b", &[]), goal("c", &[])];
        let state = state_with(&[
            ("a", GoalState::Completed),
            ("b", GoalState::ReadyForVerification),
            ("c", GoalState::Pending),
        ]);
        let p = progress(&goals, &state);
        assert_eq!(p.completed, 1);
        assert_eq!(p.in_flight, 1);
        assert_eq!(p.pending, 1);
        assert_eq!(p.percent_complete(), 33);
    }

    #[test]
    fn empty_goal_list_is_fully_complete() {
        let state = state_with(&[]);
        assert_eq!(progress(&[], &state).percent_complete(), 100);
    }
}
