//! Goal lifecycle transitions.
//!
//! ```text
//! pending ──plan ok──▶ ready_for_execution ──begin──▶ in_progress
//! in_progress ──exec ok──▶ ready_for_verification ──verify ok──▶ completed
//! ready_for_verification ──verify fail, retries left──▶ ready_for_execution
//! any active state ──fatal──▶ failed
//! ```
//!
//! `skip_goal` and `reset_goal` are operator overrides and sit outside the
//! graph. Functions here mutate state in memory; persistence is the caller's
//! job.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::core::types::{CommandResult, Phase, WorkerReport};
use crate::goal::Goal;
use crate::state::{EventKind, ExecutionState, GoalState, GoalStatus, LastError};

/// A transition outside the lifecycle graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition {from} -> {to}")]
pub struct TransitionError {
    pub from: GoalState,
    pub to: GoalState,
}

/// Check `from -> to` against the lifecycle graph.
pub fn check_transition(from: GoalState, to: GoalState) -> Result<(), TransitionError> {
    use GoalState::{
        Completed, Failed, InProgress, Pending, ReadyForExecution, ReadyForVerification,
    };
    let allowed = matches!(
        (from, to),
        (Pending, ReadyForExecution)
            | (ReadyForExecution, InProgress)
            | (InProgress, ReadyForVerification)
            | (ReadyForVerification, Completed)
            | (ReadyForVerification, ReadyForExecution)
            | (Pending | ReadyForExecution | InProgress | ReadyForVerification, Failed)
    );
    if allowed {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

/// Result of applying a phase outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: GoalState,
    pub to: GoalState,
    pub event: EventKind,
    pub message: String,
}

fn move_to(status: &mut GoalStatus, to: GoalState) -> Result<GoalState, TransitionError> {
    let from = status.status;
    check_transition(from, to)?;
    status.status = to;
    Ok(from)
}

/// Mark the start of `phase`. Execution moves the goal to `in_progress`.
pub fn begin_phase(
    status: &mut GoalStatus,
    phase: Phase,
    now: DateTime<Utc>,
) -> Result<(), TransitionError> {
    if status.started_at.is_none() {
        status.started_at = Some(now);
    }
    if phase == Phase::Execution && status.status == GoalState::ReadyForExecution {
        move_to(status, GoalState::InProgress)?;
    }
    Ok(())
}

/// Apply the worker's report for `phase`.
///
/// Only verification failures are retried. Planning and execution failures
/// fail the goal immediately.
pub fn apply_outcome(
    goal: &Goal,
    status: &mut GoalStatus,
    phase: Phase,
    report: &WorkerReport,
    now: DateTime<Utc>,
) -> Result<Transition, TransitionError> {
    if status.status.is_terminal() {
        return Err(TransitionError {
            from: status.status,
            to: status.status,
        });
    }
    if report.success {
        let (to, event) = match phase {
            Phase::Planning => (GoalState::ReadyForExecution, EventKind::PhaseSucceeded),
            Phase::Execution => (GoalState::ReadyForVerification, EventKind::PhaseSucceeded),
            Phase::Verification => (GoalState::Completed, EventKind::GoalCompleted),
        };
        let from = move_to(status, to)?;
        if to == GoalState::Completed {
            status.completed_at = Some(now);
            status.last_error = None;
        }
        return Ok(Transition {
            from,
            to,
            event,
            message: format!("{phase} succeeded"),
        });
    }

    let last_error = last_error_from(report, phase, now);
    let summary = describe_failure(&last_error);

    if phase == Phase::Verification {
        status.retry_count += 1;
        status.last_error = Some(last_error);
        if status.retry_count < goal.max_retries {
            let from = move_to(status, GoalState::ReadyForExecution)?;
            return Ok(Transition {
                from,
                to: GoalState::ReadyForExecution,
                event: EventKind::RetryScheduled,
                message: format!(
                    "verification failed ({summary}); retry {}/{}",
                    status.retry_count, goal.max_retries
                ),
            });
        }
        let from = move_to(status, GoalState::Failed)?;
        return Ok(Transition {
            from,
            to: GoalState::Failed,
            event: EventKind::GoalFailed,
            message: format!(
                "verification failed ({summary}); retries exhausted ({}/{})",
                status.retry_count, goal.max_retries
            ),
        });
    }

    status.last_error = Some(last_error);
    let from = move_to(status, GoalState::Failed)?;
    Ok(Transition {
        from,
        to: GoalState::Failed,
        event: EventKind::GoalFailed,
        message: format!("{phase} failed ({summary})"),
    })
}

/// Soft wall-clock policy: fail a goal whose total time exceeded `timeout`.
///
/// Returns `None` when the goal is within budget, has not started, or the
/// policy is disabled (`timeout` of zero).
pub fn expire(
    status: &mut GoalStatus,
    now: DateTime<Utc>,
    timeout: Duration,
) -> Result<Option<Transition>, TransitionError> {
    if timeout.is_zero() || status.status.is_terminal() {
        return Ok(None);
    }
    let Some(started_at) = status.started_at else {
        return Ok(None);
    };
    let elapsed = (now - started_at).to_std().unwrap_or(Duration::ZERO);
    if elapsed <= timeout {
        return Ok(None);
    }
    let message = format!(
        "goal exceeded its time budget ({}s > {}s)",
        elapsed.as_secs(),
        timeout.as_secs()
    );
    status.last_error = Some(LastError {
        command: "goal timeout".to_string(),
        exit_code: None,
        stdout: String::new(),
        stderr: message.clone(),
        timestamp: now,
    });
    let from = move_to(status, GoalState::Failed)?;
    Ok(Some(Transition {
        from,
        to: GoalState::Failed,
        event: EventKind::GoalTimedOut,
        message,
    }))
}

/// Operator override: mark a non-terminal goal `completed` without running it.
///
/// Management operation outside the scheduling loop, so it bypasses the
/// lifecycle graph. Terminal goals are rejected.
pub fn skip_goal(
    status: &mut GoalStatus,
    now: DateTime<Utc>,
) -> Result<Transition, TransitionError> {
    let from = status.status;
    if from.is_terminal() {
        return Err(TransitionError {
            from,
            to: GoalState::Completed,
        });
    }
    status.status = GoalState::Completed;
    status.completed_at = Some(now);
    Ok(Transition {
        from,
        to: GoalState::Completed,
        event: EventKind::GoalSkipped,
        message: format!("skipped by operator (was {from})"),
    })
}

/// Operator override: put a goal back to `pending` with a clean slate.
pub fn reset_goal(status: &mut GoalStatus) -> Transition {
    let from = status.status;
    *status = GoalStatus::pending();
    Transition {
        from,
        to: GoalState::Pending,
        event: EventKind::GoalReset,
        message: format!("reset by operator (was {from})"),
    }
}

/// Return goals left `in_progress` by a dead process to `ready_for_execution`.
///
/// This is a load-time repair, not a lifecycle transition. Each repaired goal
/// gets an `interrupted` log event. Returns the repaired ids.
pub fn recover_interrupted(state: &mut ExecutionState, now: DateTime<Utc>) -> Vec<String> {
    let interrupted: Vec<String> = state
        .goals_status
        .iter()
        .filter(|(_, status)| status.status == GoalState::InProgress)
        .map(|(id, _)| id.clone())
        .collect();
    for id in &interrupted {
        if let Some(status) = state.goals_status.get_mut(id) {
            status.status = GoalState::ReadyForExecution;
        }
        state.record(
            now,
            id,
            EventKind::Interrupted,
            "execution was interrupted; scheduled again",
        );
    }
    if !interrupted.is_empty() {
        state.current_goal_id = None;
    }
    interrupted
}

fn last_error_from(report: &WorkerReport, phase: Phase, now: DateTime<Utc>) -> LastError {
    match report.first_failure() {
        Some(CommandResult {
            command,
            exit_code,
            stdout,
            stderr,
            ..
        }) => LastError {
            command: command.clone(),
            exit_code: *exit_code,
            stdout: stdout.clone(),
            stderr: stderr.clone(),
            timestamp: now,
        },
        None => LastError {
            command: format!("{phase} worker"),
            exit_code: None,
            stdout: String::new(),
            stderr: "worker reported failure without command output".to_string(),
            timestamp: now,
        },
    }
}

fn describe_failure(error: &LastError) -> String {
    match error.exit_code {
        Some(code) => format!("`{}` exited with {code}", error.command),
        None => format!("`{}` did not exit cleanly", error.command),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{failed_command, goal, ok_command, ts};

    fn status_in(state: GoalState, retry_count: u32) -> GoalStatus {
        GoalStatus {
            status: state,
            retry_count,
            ..GoalStatus::pending()
        }
    }

    #[test]
    fn lifecycle_graph_rejects_skips_and_terminal_exits() {
        assert!(check_transition(GoalState::Pending, GoalState::ReadyForExecution).is_ok());
        assert!(check_transition(GoalState::Pending, GoalState::Completed).is_err());
        assert!(check_transition(GoalState::ReadyForExecution, GoalState::Completed).is_err());
        assert!(check_transition(GoalState::Completed, GoalState::Pending).is_err());
        assert!(check_transition(GoalState::Failed, GoalState::ReadyForExecution).is_err());
        for from in [
            GoalState::Pending,
            GoalState::ReadyForExecution,
            GoalState::InProgress,
            GoalState::ReadyForVerification,
        ] {
            assert!(check_transition(from, GoalState::Failed).is_ok());
        }
    }

    #[test]
    fn happy_path_walks_every_state() {
        let g = goal("a", &[]);
        let mut status = GoalStatus::pending();
        let ok = WorkerReport::success(vec![ok_command("agent")]);

        begin_phase(&mut status, Phase::Planning, ts(0)).expect("begin plan");
        apply_outcome(&g, &mut status, Phase::Planning, &ok, ts(1)).expect("plan");
        assert_eq!(status.status, GoalState::ReadyForExecution);

        begin_phase(&mut status, Phase::Execution, ts(2)).expect("begin exec");
        assert_eq!(status.status, GoalState::InProgress);
        apply_outcome(&g, &mut status, Phase::Execution, &ok, ts(3)).expect("exec");
        assert_eq!(status.status, GoalState::ReadyForVerification);

        let t = apply_outcome(&g, &mut status, Phase::Verification, &ok, ts(4)).expect("verify");
        assert_eq!(t.event, EventKind::GoalCompleted);
        assert_eq!(status.status, GoalState::Completed);
        assert_eq!(status.started_at, Some(ts(0)));
        assert_eq!(status.completed_at, Some(ts(4)));
    }

    #[test]
    fn verification_failure_with_retries_left_goes_back_to_execution() {
        let mut g = goal("a", &[]);
        g.max_retries = 3;
        let mut status = status_in(GoalState::ReadyForVerification, 1);
        let report = WorkerReport::failure(vec![
            ok_command("cargo build"),
            failed_command("cargo test", 101, "1 test failed"),
        ]);

        let t = apply_outcome(&g, &mut status, Phase::Verification, &report, ts(5))
            .expect("apply");

        assert_eq!(t.to, GoalState::ReadyForExecution);
        assert_eq!(t.event, EventKind::RetryScheduled);
        assert_eq!(status.retry_count, 2);
        let last_error = status.last_error.expect("last error");
        assert_eq!(last_error.command, "cargo test");
        assert_eq!(last_error.exit_code, Some(101));
        assert_eq!(last_error.stderr, "1 test failed");
        assert_eq!(last_error.timestamp, ts(5));
    }

    #[test]
    fn verification_failure_on_last_retry_fails_the_goal() {
        let mut g = goal("a", &[]);
        g.max_retries = 3;
        let mut status = status_in(GoalState::ReadyForVerification, 2);
        let report = WorkerReport::failure(vec![failed_command("just ci", 1, "boom")]);

        let t = apply_outcome(&g, &mut status, Phase::Verification, &report, ts(0))
            .expect("apply");

        assert_eq!(t.to, GoalState::Failed);
        assert_eq!(status.status, GoalState::Failed);
        assert!(status.last_error.is_some());
    }

    #[test]
    fn zero_max_retries_fails_on_first_verification_failure() {
        let mut g = goal("a", &[]);
        g.max_retries = 0;
        let mut status = status_in(GoalState::ReadyForVerification, 0);
        let report = WorkerReport::failure(vec![failed_command("check", 1, "")]);
        apply_outcome(&g, &mut status, Phase::Verification, &report, ts(0)).expect("apply");
        assert_eq!(status.status, GoalState::Failed);
    }

    #[test]
    fn planning_and_execution_failures_are_not_retried() {
        let g = goal("a", &[]);
        let report = WorkerReport::failure(vec![failed_command("agent", 2, "crash")]);

        let mut planning = status_in(GoalState::Pending, 0);
        apply_outcome(&g, &mut planning, Phase::Planning, &report, ts(0)).expect("plan");
        assert_eq!(planning.status, GoalState::Failed);
        assert_eq!(planning.retry_count, 0);

        let mut execution = status_in(GoalState::InProgress, 0);
        apply_outcome(&g, &mut execution, Phase::Execution, &report, ts(0)).expect("exec");
        assert_eq!(execution.status, GoalState::Failed);
        assert_eq!(execution.retry_count, 0);
    }

    #[test]
    fn completion_clears_previous_error() {
        let g = goal("a", &[]);
        let mut status = status_in(GoalState::ReadyForVerification, 1);
        status.last_error = Some(LastError {
            command: "old".to_string(),
            exit_code: Some(1),
            stdout: String::new(),
            stderr: String::new(),
            timestamp: ts(0),
        });
        let ok = WorkerReport::success(vec![ok_command("check")]);
        apply_outcome(&g, &mut status, Phase::Verification, &ok, ts(1)).expect("apply");
        assert!(status.last_error.is_none());
        assert_eq!(status.retry_count, 1);
    }

    #[test]
    fn applying_to_a_terminal_goal_is_rejected() {
        let g = goal("a", &[]);
        let mut status = status_in(GoalState::Completed, 0);
        let ok = WorkerReport::success(Vec::new());
        let err = apply_outcome(&g, &mut status, Phase::Verification, &ok, ts(0))
            .expect_err("terminal");
        assert_eq!(err.from, GoalState::Completed);
        assert_eq!(status.status, GoalState::Completed);
    }

    #[test]
    fn skip_completes_open_goals_only() {
        let mut status = status_in(GoalState::ReadyForVerification, 2);
        let t = skip_goal(&mut status, ts(7)).expect("skip");
        assert_eq!(t.event, EventKind::GoalSkipped);
        assert_eq!(status.status, GoalState::Completed);
        assert_eq!(status.completed_at, Some(ts(7)));

        let err = skip_goal(&mut status, ts(8)).expect_err("already completed");
        assert_eq!(err.from, GoalState::Completed);
        let mut failed = status_in(GoalState::Failed, 3);
        assert!(skip_goal(&mut failed, ts(8)).is_err());
    }

    #[test]
    fn reset_clears_retries_errors_and_timestamps() {
        let mut status = status_in(GoalState::Failed, 3);
        status.started_at = Some(ts(1));
        status.last_error = Some(LastError {
            command: "check".to_string(),
            exit_code: Some(1),
            stdout: String::new(),
            stderr: String::new(),
            timestamp: ts(2),
        });
        let t = reset_goal(&mut status);
        assert_eq!(t.from, GoalState::Failed);
        assert_eq!(status, GoalStatus::pending());
    }

    #[test]
    fn interrupted_execution_is_rescheduled() {
        let goals = vec![goal("a", &[]), goal("b", &[])];
        let mut state = ExecutionState::initialize(&goals);
        state.goals_status.get_mut("b").expect("b").status = GoalState::InProgress;
        state.current_goal_id = Some("b".to_string());

        let repaired = recover_interrupted(&mut state, ts(9));

        assert_eq!(repaired, vec!["b"]);
        assert_eq!(state.status_of("b"), Some(GoalState::ReadyForExecution));
        assert_eq!(state.status_of("a"), Some(GoalState::Pending));
        assert!(state.current_goal_id.is_none());
        let event = state.execution_log.last().expect("event");
        assert_eq!(event.event, EventKind::Interrupted);
        assert_eq!(event.goal_id, "b");

        assert!(recover_interrupted(&mut state, ts(10)).is_empty());
    }

    #[test]
    fn expire_fails_goals_over_budget_only() {
        let mut status = status_in(GoalState::ReadyForVerification, 0);
        status.started_at = Some(ts(0));

        let within = expire(&mut status, ts(60), Duration::from_secs(120)).expect("expire");
        assert!(within.is_none());

        let disabled = expire(&mut status, ts(600), Duration::ZERO).expect("expire");
        assert!(disabled.is_none());

        let over = expire(&mut status, ts(600), Duration::from_secs(120))
            .expect("expire")
            .expect("transition");
        assert_eq!(over.event, EventKind::GoalTimedOut);
        assert_eq!(status.status, GoalState::Failed);
    }
}
