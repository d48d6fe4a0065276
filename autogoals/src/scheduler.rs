//! Orchestration for a single scheduling step.
//!
//! One step is one phase of one goal: select, check the goal's time budget,
//! persist the phase start, invoke the worker, apply the outcome, persist.

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::core::selector::next_goal;
use crate::core::state_update::{
    Transition, apply_outcome, begin_phase, expire, recover_interrupted,
};
use crate::core::types::{CommandResult, Phase, WorkerReport};
use crate::error::ExternalToolError;
use crate::io::state_store::StateStore;
use crate::io::worker::{Worker, WorkerRequest};
use crate::state::{EventKind, ExecutionState, GoalState, GoalStatus};
use crate::validate::Project;

/// Result of a single step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub goal_id: String,
    pub phase: Phase,
    pub transition: Transition,
}

/// Run one phase of the next eligible goal.
///
/// Returns `Ok(None)` when no goal is eligible. The state is persisted
/// before the worker is invoked and again after the outcome is applied.
/// An [`ExternalToolError`] from the worker aborts the step with the goal
/// rescheduled; any other worker error fails the phase.
#[instrument(skip_all)]
pub fn run_step<W: Worker>(
    project: &Project,
    store: &StateStore,
    state: &mut ExecutionState,
    worker: &W,
) -> Result<Option<StepOutcome>> {
    let Some(goal) = next_goal(project.goals(), state) else {
        return Ok(None);
    };
    let goal_id = goal.id.clone();
    let current = state
        .status_of(&goal_id)
        .ok_or_else(|| anyhow!("missing status for goal '{goal_id}'"))?;
    let phase = Phase::for_state(current)
        .ok_or_else(|| anyhow!("goal '{goal_id}' selected in terminal state {current}"))?;

    let now = Utc::now();
    let status = status_mut(state, &goal_id)?;
    if let Some(transition) = expire(status, now, project.config.goal_timeout())? {
        warn!(goal = %goal_id, "{}", transition.message);
        state.record(now, &goal_id, transition.event, transition.message.clone());
        state.current_goal_id = None;
        store.save(state)?;
        return Ok(Some(StepOutcome {
            goal_id,
            phase,
            transition,
        }));
    }

    begin_phase(status_mut(state, &goal_id)?, phase, now)?;
    state.current_goal_id = Some(goal_id.clone());
    state.record(now, &goal_id, EventKind::PhaseStarted, format!("{phase} started"));
    store.save(state).context("persist phase start")?;
    info!(goal = %goal_id, %phase, "phase started");

    let report = {
        let status = &state.goals_status[&goal_id];
        let request = WorkerRequest {
            goal,
            phase,
            workspace: &project.paths.root,
            project_name: &project.goals_file.project_name,
            retry_count: status.retry_count,
            last_error: status.last_error.as_ref(),
            log_dir: project.paths.goal_log_dir(&goal_id),
        };
        worker.invoke(&request)
    };

    let report = match report {
        Ok(report) => report,
        Err(err) if err.downcast_ref::<ExternalToolError>().is_some() => {
            let now = Utc::now();
            recover_interrupted(state, now);
            state.current_goal_id = None;
            store.save(state).context("persist state after tool failure")?;
            return Err(err);
        }
        Err(err) => {
            warn!(goal = %goal_id, %phase, error = %format!("{err:#}"), "worker error");
            state.record(
                Utc::now(),
                &goal_id,
                EventKind::PhaseFailed,
                format!("{phase} worker error: {err:#}"),
            );
            WorkerReport::failure(vec![CommandResult {
                command: format!("{phase} worker"),
                exit_code: None,
                stdout: String::new(),
                stderr: format!("{err:#}"),
                timed_out: false,
            }])
        }
    };

    let now = Utc::now();
    let status = status_mut(state, &goal_id)?;
    let transition = apply_outcome(goal, status, phase, &report, now)?;
    state.record(now, &goal_id, transition.event, transition.message.clone());
    if transition.to.is_terminal() {
        state.current_goal_id = None;
    }
    store.save(state).context("persist phase outcome")?;

    match transition.to {
        GoalState::Failed => warn!(goal = %goal_id, "{}", transition.message),
        _ => info!(goal = %goal_id, to = %transition.to, "{}", transition.message),
    }
    Ok(Some(StepOutcome {
        goal_id,
        phase,
        transition,
    }))
}

fn status_mut<'a>(state: &'a mut ExecutionState, goal_id: &str) -> Result<&'a mut GoalStatus> {
    state
        .goals_status
        .get_mut(goal_id)
        .ok_or_else(|| anyhow!("missing status for goal '{goal_id}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedReply, ScriptedWorker, TestProject};
    use crate::validate::load_project;

    fn setup(yaml: &str) -> (TestProject, Project, StateStore, ExecutionState) {
        let test = TestProject::new(yaml).expect("project");
        let project = load_project(&test.paths).expect("load");
        let store = StateStore::new(&test.paths);
        let state = store.load_or_initialize(project.goals()).expect("state");
        (test, project, store, state)
    }

    #[test]
    fn each_step_advances_one_phase_and_persists() {
        let (_test, project, store, mut state) = setup("goals:\n  - id: a\n");
        let worker = ScriptedWorker::succeeding();

        let plan = run_step(&project, &store, &mut state, &worker)
            .expect("step")
            .expect("outcome");
        assert_eq!(plan.phase, Phase::Planning);
        assert_eq!(plan.transition.to, GoalState::ReadyForExecution);
        assert_eq!(state.current_goal_id.as_deref(), Some("a"));

        let persisted = store.load(project.goals()).expect("load").expect("state");
        assert_eq!(persisted, state);

        let exec = run_step(&project, &store, &mut state, &worker)
            .expect("step")
            .expect("outcome");
        assert_eq!(exec.phase, Phase::Execution);
        assert_eq!(exec.transition.from, GoalState::InProgress);

        let verify = run_step(&project, &store, &mut state, &worker)
            .expect("step")
            .expect("outcome");
        assert_eq!(verify.transition.to, GoalState::Completed);
        assert!(state.current_goal_id.is_none());

        assert!(
            run_step(&project, &store, &mut state, &worker)
                .expect("step")
                .is_none()
        );
    }

    #[test]
    fn plain_worker_error_fails_the_phase() {
        let (_test, project, store, mut state) = setup("goals:\n  - id: a\n");
        let worker = ScriptedWorker::new(vec![ScriptedReply::Error("log dir unwritable".into())]);

        let outcome = run_step(&project, &store, &mut state, &worker)
            .expect("step")
            .expect("outcome");

        assert_eq!(outcome.transition.to, GoalState::Failed);
        let last_error = state.goals_status["a"].last_error.clone().expect("error");
        assert_eq!(last_error.command, "planning worker");
        assert!(last_error.stderr.contains("log dir unwritable"));
        assert!(
            state
                .execution_log
                .iter()
                .any(|event| event.event == EventKind::PhaseFailed)
        );
    }

    #[test]
    fn missing_tool_aborts_and_reschedules_execution() {
        let (_test, project, store, mut state) = setup("goals:\n  - id: a\n");
        let worker = ScriptedWorker::new(vec![
            ScriptedReply::ok(),
            ScriptedReply::ToolMissing("claude".into()),
        ]);

        run_step(&project, &store, &mut state, &worker).expect("plan");
        let err = run_step(&project, &store, &mut state, &worker).expect_err("tool missing");

        assert!(err.downcast_ref::<ExternalToolError>().is_some());
        assert_eq!(state.status_of("a"), Some(GoalState::ReadyForExecution));
        let persisted = store.load(project.goals()).expect("load").expect("state");
        assert_eq!(persisted.status_of("a"), Some(GoalState::ReadyForExecution));
    }
}
