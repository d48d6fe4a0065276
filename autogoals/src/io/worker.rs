//! Worker abstraction for phase execution.
//!
//! The [`Worker`] trait decouples the scheduler from the agent and the
//! execution backend. Tests use scripted workers that return predetermined
//! reports without spawning processes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use super::backend::{ContainerBackend, ExecRequest};
use super::config::RunnerConfig;
use super::phase_log::{PhaseLogPaths, write_phase_log, write_prompt};
use super::prompt::{PromptInputs, render_execution, render_planning};
use crate::core::types::{Phase, WorkerReport};
use crate::goal::Goal;
use crate::state::LastError;

/// Everything a worker needs for one phase of one goal.
#[derive(Debug, Clone)]
pub struct WorkerRequest<'a> {
    pub goal: &'a Goal,
    pub phase: Phase,
    pub workspace: &'a Path,
    pub project_name: &'a str,
    pub retry_count: u32,
    /// Failure context from the previous verification attempt.
    pub last_error: Option<&'a LastError>,
    /// `.autogoals/logs/<goal-id>/`
    pub log_dir: PathBuf,
}

impl WorkerRequest<'_> {
    /// 1-indexed attempt number for log file names.
    pub fn attempt(&self) -> u32 {
        self.retry_count + 1
    }

    pub fn plan_path(&self) -> PathBuf {
        self.log_dir.join("plan.md")
    }
}

/// Abstraction over phase execution.
///
/// `Ok` carries the phase outcome, successful or not. `Err` means the phase
/// could not be attempted at all.
pub trait Worker {
    fn invoke(&self, request: &WorkerRequest<'_>) -> Result<WorkerReport>;
}

/// Worker that runs the configured agent CLI and verification commands
/// through a [`ContainerBackend`].
pub struct AgentWorker<B> {
    backend: B,
    agent_command: Vec<String>,
    agent_timeout: Duration,
    verification_timeout: Duration,
    env: BTreeMap<String, String>,
}

impl<B: ContainerBackend> AgentWorker<B> {
    pub fn new(backend: B, config: &RunnerConfig) -> Self {
        Self {
            backend,
            agent_command: config.agent.command.clone(),
            agent_timeout: config.agent_timeout(),
            verification_timeout: config.verification_timeout(),
            env: config.backend.env.clone(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn run_agent(&self, request: &WorkerRequest<'_>, logs: &PhaseLogPaths) -> Result<WorkerReport> {
        let plan_path = relative_to(&request.plan_path(), request.workspace);
        let inputs = PromptInputs {
            goal: request.goal,
            project_name: request.project_name,
            plan_path,
            retry_count: request.retry_count,
            last_error: request.last_error,
        };
        let prompt = match request.phase {
            Phase::Planning => render_planning(&inputs)?,
            _ => render_execution(&inputs)?,
        };
        write_prompt(logs, &prompt)?;

        let mut argv = self.agent_command.clone();
        argv.push(prompt);
        info!(backend = self.backend.name(), "invoking agent");
        let mut result = self.backend.execute(&ExecRequest {
            workspace: request.workspace,
            argv: &argv,
            env: &self.env,
            timeout: self.agent_timeout,
        })?;
        result.command = self.agent_command.join(" ");
        write_phase_log(logs, std::slice::from_ref(&result))?;

        if result.succeeded() {
            debug!("agent finished");
            Ok(WorkerReport::success(vec![result]))
        } else {
            warn!(exit_code = ?result.exit_code, timed_out = result.timed_out, "agent failed");
            Ok(WorkerReport::failure(vec![result]))
        }
    }

    fn run_verification(
        &self,
        request: &WorkerRequest<'_>,
        logs: &PhaseLogPaths,
    ) -> Result<WorkerReport> {
        let mut results = Vec::new();
        for command in &request.goal.verification_commands {
            let argv = vec!["sh".to_string(), "-c".to_string(), command.clone()];
            let mut result = self.backend.execute(&ExecRequest {
                workspace: request.workspace,
                argv: &argv,
                env: &self.env,
                timeout: self.verification_timeout,
            })?;
            result.command = command.clone();
            let passed = result.succeeded();
            debug!(command = %command, exit_code = ?result.exit_code, passed, "verification command finished");
            results.push(result);
            if !passed {
                write_phase_log(logs, &results)?;
                return Ok(WorkerReport::failure(results));
            }
        }
        write_phase_log(logs, &results)?;
        Ok(WorkerReport::success(results))
    }
}

impl<B: ContainerBackend> Worker for AgentWorker<B> {
    #[instrument(skip_all, fields(goal = %request.goal.id, phase = %request.phase, attempt = request.attempt()))]
    fn invoke(&self, request: &WorkerRequest<'_>) -> Result<WorkerReport> {
        let logs = PhaseLogPaths::new(&request.log_dir, request.phase, request.attempt());
        match request.phase {
            Phase::Planning | Phase::Execution => self.run_agent(request, &logs),
            Phase::Verification => self.run_verification(request, &logs),
        }
    }
}

fn relative_to(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}
