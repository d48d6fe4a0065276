//! Test-only builders, scripted workers, and a fake backend.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use anyhow::{Result, anyhow};
use chrono::{DateTime, TimeZone, Utc};

use crate::core::types::{CommandResult, Phase, WorkerReport};
use crate::error::ExternalToolError;
use crate::goal::{DEFAULT_MAX_RETRIES, Goal};
use crate::io::backend::{ContainerBackend, ExecRequest};
use crate::io::init::AutogoalsPaths;
use crate::io::worker::{Worker, WorkerRequest};
use crate::state::{ExecutionState, GoalState, GoalStatus};

/// Goal with deterministic defaults and the given dependencies.
pub fn goal(id: &str, deps: &[&str]) -> Goal {
    Goal {
        id: id.to_string(),
        name: format!("{id} name"),
        description: format!("{id} description"),
        dependencies: deps.iter().map(|dep| dep.to_string()).collect(),
        acceptance_criteria: Vec::new(),
        verification_commands: Vec::new(),
        max_retries: DEFAULT_MAX_RETRIES,
        branch_name: None,
    }
}

/// State holding exactly the listed goals with the listed statuses.
pub fn state_with(entries: &[(&str, GoalState)]) -> ExecutionState {
    let mut state = ExecutionState::initialize(&[]);
    for (id, status) in entries {
        state.goals_status.insert(
            id.to_string(),
            GoalStatus {
                status: *status,
                ..GoalStatus::pending()
            },
        );
    }
    state
}

/// Fixed timestamp `secs` seconds after 2024-01-01T00:00:00Z.
pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_704_067_200 + secs, 0)
        .single()
        .expect("valid timestamp")
}

pub fn ok_command(command: &str) -> CommandResult {
    CommandResult {
        command: command.to_string(),
        exit_code: Some(0),
        stdout: String::new(),
        stderr: String::new(),
        timed_out: false,
    }
}

pub fn failed_command(command: &str, exit_code: i32, stderr: &str) -> CommandResult {
    CommandResult {
        command: command.to_string(),
        exit_code: Some(exit_code),
        stdout: String::new(),
        stderr: stderr.to_string(),
        timed_out: false,
    }
}

/// One scripted worker reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Report(WorkerReport),
    /// A plain error (e.g. a log write failed).
    Error(String),
    /// The agent CLI is missing.
    ToolMissing(String),
}

impl ScriptedReply {
    pub fn ok() -> Self {
        ScriptedReply::Report(WorkerReport::success(vec![ok_command("agent")]))
    }

    pub fn fail(command: &str, exit_code: i32, stderr: &str) -> Self {
        ScriptedReply::Report(WorkerReport::failure(vec![failed_command(
            command, exit_code, stderr,
        )]))
    }
}

/// Worker that replays scripted replies and records every call.
///
/// Once the script is exhausted it returns the fallback reply, or an error
/// when no fallback is set.
pub struct ScriptedWorker {
    replies: RefCell<VecDeque<ScriptedReply>>,
    fallback: Option<ScriptedReply>,
    calls: RefCell<Vec<(String, Phase)>>,
}

impl ScriptedWorker {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            fallback: None,
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Worker whose every phase succeeds.
    pub fn succeeding() -> Self {
        Self::new(Vec::new()).with_fallback(ScriptedReply::ok())
    }

    pub fn with_fallback(mut self, reply: ScriptedReply) -> Self {
        self.fallback = Some(reply);
        self
    }

    pub fn calls(&self) -> Vec<(String, Phase)> {
        self.calls.borrow().clone()
    }
}

impl Worker for ScriptedWorker {
    fn invoke(&self, request: &WorkerRequest<'_>) -> Result<WorkerReport> {
        self.calls
            .borrow_mut()
            .push((request.goal.id.clone(), request.phase));
        let reply = self
            .replies
            .borrow_mut()
            .pop_front()
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| anyhow!("scripted worker exhausted"))?;
        match reply {
            ScriptedReply::Report(report) => Ok(report),
            ScriptedReply::Error(message) => Err(anyhow!(message)),
            ScriptedReply::ToolMissing(tool) => Err(ExternalToolError::new(
                tool,
                "program not found on PATH",
                "install it",
            )
            .into()),
        }
    }
}

/// Backend that replays scripted command results and records argv.
pub struct FakeBackend {
    results: RefCell<VecDeque<CommandResult>>,
    calls: RefCell<Vec<Vec<String>>>,
}

impl FakeBackend {
    pub fn new(results: Vec<CommandResult>) -> Self {
        Self {
            results: RefCell::new(results.into()),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }
}

impl ContainerBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn execute(&self, request: &ExecRequest<'_>) -> Result<CommandResult> {
        self.calls.borrow_mut().push(request.argv.to_vec());
        self.results
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("fake backend exhausted"))
    }
}

/// Temporary project directory with a goal file.
pub struct TestProject {
    _temp: tempfile::TempDir,
    pub paths: AutogoalsPaths,
}

impl TestProject {
    pub fn new(goals_yaml: &str) -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let paths = AutogoalsPaths::new(temp.path());
        fs::write(&paths.goals_path, goals_yaml)?;
        Ok(Self { _temp: temp, paths })
    }

    pub fn root(&self) -> &Path {
        &self.paths.root
    }
}
