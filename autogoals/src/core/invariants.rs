//! Structural invariants for the goal list and the persisted state.

use std::collections::HashSet;

use crate::goal::Goal;
use crate::state::{ExecutionState, STATE_VERSION};

/// Check goal-list invariants not expressible in the JSON Schema:
/// - at least one goal
/// - ids unique and limited to `[A-Za-z0-9._-]`
pub fn validate_goal_invariants(goals: &[Goal]) -> Vec<String> {
    let mut errors = Vec::new();
    if goals.is_empty() {
        errors.push("goal list must not be empty".to_string());
    }
    let mut seen = HashSet::new();
    for goal in goals {
        if let Err(err) = validate_id(&goal.id) {
            errors.push(err);
        }
        if !seen.insert(goal.id.as_str()) {
            errors.push(format!("duplicate goal id '{}'", goal.id));
        }
    }
    errors
}

/// Validate that an id is safe to use in log paths and container labels.
pub fn validate_id(id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err("goal id must not be empty".to_string());
    }
    if id
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(format!("goal id must be [A-Za-z0-9._-] only (got '{id}')"));
    }
    if id == "." || id == ".." {
        return Err(format!("goal id '{id}' is reserved"));
    }
    Ok(())
}

/// Check that `state` describes exactly the configured goals.
pub fn validate_state_invariants(goals: &[Goal], state: &ExecutionState) -> Vec<String> {
    let mut errors = Vec::new();
    if state.version != STATE_VERSION {
        errors.push(format!(
            "unsupported state version {} (expected {STATE_VERSION})",
            state.version
        ));
    }

    let declared: HashSet<&str> = goals.iter().map(|goal| goal.id.as_str()).collect();
    for goal in goals {
        if !state.goals_status.contains_key(&goal.id) {
            errors.push(format!("missing status for goal '{}'", goal.id));
        }
    }
    for id in state.goals_status.keys() {
        if !declared.contains(id.as_str()) {
            errors.push(format!("status for undeclared goal '{id}'"));
        }
    }
    if let Some(current) = &state.current_goal_id
        && !declared.contains(current.as_str())
    {
        errors.push(format!("current_goal_id '{current}' is not a declared goal"));
    }
    errors
}
