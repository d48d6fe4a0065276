//! Operator overrides: `autogoals skip <id>` and `autogoals reset <id>`.
//!
//! These assume no loop is running against the same project.

use anyhow::{Result, anyhow, bail};
use chrono::Utc;
use tracing::{info, instrument};

use crate::core::state_update::{Transition, reset_goal, skip_goal};
use crate::io::state_store::StateStore;
use crate::validate::Project;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Override {
    Skip,
    Reset,
}

/// Apply `action` to `goal_id` and persist the state.
#[instrument(skip_all, fields(goal = %goal_id, action = ?action))]
pub fn override_goal(project: &Project, goal_id: &str, action: Override) -> Result<Transition> {
    if project.goal(goal_id).is_none() {
        bail!("unknown goal id '{goal_id}'");
    }
    let store = StateStore::new(&project.paths);
    let mut state = store.load_or_initialize(project.goals())?;
    let now = Utc::now();
    let status = state
        .goals_status
        .get_mut(goal_id)
        .ok_or_else(|| anyhow!("missing status for goal '{goal_id}'"))?;

    let transition = match action {
        Override::Skip => skip_goal(status, now).map_err(|err| {
            anyhow!("cannot skip goal '{goal_id}': {err} (use `autogoals reset` first)")
        })?,
        Override::Reset => reset_goal(status),
    };
    if state.current_goal_id.as_deref() == Some(goal_id) {
        state.current_goal_id = None;
    }
    state.record(now, goal_id, transition.event, transition.message.clone());
    store.save(&state)?;
    info!(from = %transition.from, to = %transition.to, "goal overridden");
    Ok(transition)
}
