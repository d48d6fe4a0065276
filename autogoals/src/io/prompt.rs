//! Prompt rendering for the planning and execution phases.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::goal::Goal;
use crate::state::LastError;

const PLANNING_TEMPLATE: &str = include_str!("prompts/planning.md");
const EXECUTION_TEMPLATE: &str = include_str!("prompts/execution.md");

/// Keep at most this many bytes from the tail of failure output.
const FAILURE_TAIL_BYTES: usize = 4_000;

#[derive(Debug, Clone, Serialize)]
struct GoalContext<'a> {
    id: &'a str,
    title: &'a str,
    description: &'a str,
    dependencies: &'a [String],
    acceptance_criteria: &'a [String],
    verification_commands: &'a [String],
}

impl<'a> GoalContext<'a> {
    fn from_goal(goal: &'a Goal) -> Self {
        Self {
            id: &goal.id,
            title: goal.title(),
            description: goal.description.trim(),
            dependencies: &goal.dependencies,
            acceptance_criteria: &goal.acceptance_criteria,
            verification_commands: &goal.verification_commands,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct FailureContext {
    command: String,
    exit_code: String,
    stdout: String,
    stderr: String,
}

impl FailureContext {
    fn from_error(error: &LastError) -> Self {
        Self {
            command: error.command.clone(),
            exit_code: error
                .exit_code
                .map_or_else(|| "none".to_string(), |code| code.to_string()),
            stdout: tail(error.stdout.trim(), FAILURE_TAIL_BYTES),
            stderr: tail(error.stderr.trim(), FAILURE_TAIL_BYTES),
        }
    }
}

/// Inputs shared by both prompts.
#[derive(Debug, Clone)]
pub struct PromptInputs<'a> {
    pub goal: &'a Goal,
    pub project_name: &'a str,
    /// Plan file location, relative to the workspace root.
    pub plan_path: String,
    pub retry_count: u32,
    pub last_error: Option<&'a LastError>,
}

struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("planning", PLANNING_TEMPLATE)
            .expect("planning template should be valid");
        env.add_template("execution", EXECUTION_TEMPLATE)
            .expect("execution template should be valid");
        Self { env }
    }
}

fn project_label(name: &str) -> &str {
    if name.trim().is_empty() {
        "current"
    } else {
        name
    }
}

pub fn render_planning(input: &PromptInputs<'_>) -> Result<String> {
    let engine = PromptEngine::new();
    let template = engine.env.get_template("planning")?;
    let rendered = template.render(context! {
        project_name => project_label(input.project_name),
        plan_path => &input.plan_path,
        goal => GoalContext::from_goal(input.goal),
    })?;
    Ok(rendered)
}

pub fn render_execution(input: &PromptInputs<'_>) -> Result<String> {
    let engine = PromptEngine::new();
    let template = engine.env.get_template("execution")?;
    let rendered = template.render(context! {
        project_name => project_label(input.project_name),
        plan_path => &input.plan_path,
        goal => GoalContext::from_goal(input.goal),
        attempt => input.retry_count + 1,
        max_attempts => input.goal.max_retries.max(1),
        failure => input.last_error.map(FailureContext::from_error),
    })?;
    Ok(rendered)
}

/// Last `max` bytes of `text`, cut on a char boundary.
fn tail(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("[... {start} bytes elided]\n{}", &text[start..])
}
