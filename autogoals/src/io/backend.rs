//! Execution environments for agent and verification commands.
//!
//! The scheduler only sees [`ContainerBackend::execute`]. The docker backend
//! keeps one long-lived container per workspace, named deterministically
//! from the resolved workspace path, and creates or starts it on first use.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use super::config::{BackendConfig, BackendKind, RunnerConfig};
use super::process::{is_spawn_not_found, run_command_with_timeout};
use crate::core::types::CommandResult;
use crate::error::ExternalToolError;

/// Mount point of the workspace inside docker containers.
pub const CONTAINER_WORKDIR: &str = "/workspace";

const MANAGEMENT_TIMEOUT: Duration = Duration::from_secs(120);
const CREATE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// A single command to run in a workspace.
#[derive(Debug, Clone)]
pub struct ExecRequest<'a> {
    pub workspace: &'a Path,
    pub argv: &'a [String],
    pub env: &'a BTreeMap<String, String>,
    pub timeout: Duration,
}

/// Narrow execution contract: run one command, return its captured result.
///
/// A non-zero exit is a normal `Ok` result. `Err` means the environment
/// itself is unusable.
pub trait ContainerBackend {
    fn name(&self) -> &'static str;
    fn execute(&self, request: &ExecRequest<'_>) -> Result<CommandResult>;
}

/// Runs commands as host processes with `current_dir = workspace`.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    output_limit_bytes: usize,
}

impl LocalBackend {
    pub fn new(output_limit_bytes: usize) -> Self {
        Self { output_limit_bytes }
    }
}

impl ContainerBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    #[instrument(skip_all, fields(program = request.argv.first().map(String::as_str)))]
    fn execute(&self, request: &ExecRequest<'_>) -> Result<CommandResult> {
        let (program, args) = request
            .argv
            .split_first()
            .ok_or_else(|| anyhow!("empty command"))?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(request.workspace)
            .envs(request.env);
        let output = run_command_with_timeout(cmd, request.timeout, self.output_limit_bytes)
            .map_err(|err| {
                if is_spawn_not_found(&err) {
                    anyhow::Error::from(ExternalToolError::new(
                        program.clone(),
                        "program not found on PATH",
                        format!("install `{program}` or change the command in .autogoals/config.toml"),
                    ))
                } else {
                    err.context(format!("run {program}"))
                }
            })?;
        Ok(output.into_result(request.argv.join(" ")))
    }
}

/// Lifecycle state of a workspace container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Missing,
    Running,
    Stopped,
}

impl ContainerState {
    pub fn as_str(self) -> &'static str {
        match self {
            ContainerState::Missing => "missing",
            ContainerState::Running => "running",
            ContainerState::Stopped => "stopped",
        }
    }
}

/// Runs commands through `docker exec` in a per-workspace container.
#[derive(Debug, Clone)]
pub struct DockerBackend {
    docker_bin: String,
    image: String,
    output_limit_bytes: usize,
}

impl DockerBackend {
    pub fn new(config: &BackendConfig, output_limit_bytes: usize) -> Self {
        Self {
            docker_bin: config.docker_bin.clone(),
            image: config.image.clone(),
            output_limit_bytes,
        }
    }

    /// Current state of the workspace container.
    pub fn state(&self, workspace: &Path) -> Result<ContainerState> {
        let name = container_name(workspace)?;
        let result = self.docker(
            &[
                "inspect".to_string(),
                "-f".to_string(),
                "{{.State.Running}}".to_string(),
                name.clone(),
            ],
            MANAGEMENT_TIMEOUT,
        )?;
        if result.succeeded() {
            let state = match result.stdout.trim() {
                "true" => ContainerState::Running,
                _ => ContainerState::Stopped,
            };
            debug!(container = %name, state = state.as_str(), "inspected container");
            return Ok(state);
        }
        if is_missing_object(&result.stderr) {
            return Ok(ContainerState::Missing);
        }
        Err(daemon_error(&result).into())
    }

    /// Create or start the workspace container as needed. Returns its name.
    #[instrument(skip_all, fields(workspace = %workspace.display()))]
    pub fn ensure_running(&self, workspace: &Path) -> Result<String> {
        let name = container_name(workspace)?;
        match self.state(workspace)? {
            ContainerState::Running => {}
            ContainerState::Stopped => {
                info!(container = %name, "starting container");
                self.docker_checked(&["start".to_string(), name.clone()], MANAGEMENT_TIMEOUT)?;
            }
            ContainerState::Missing => {
                let mount = format!("{}:{CONTAINER_WORKDIR}", resolve_workspace(workspace)?.display());
                info!(container = %name, image = %self.image, "creating container");
                self.docker_checked(
                    &[
                        "run".to_string(),
                        "-d".to_string(),
                        "--name".to_string(),
                        name.clone(),
                        "-v".to_string(),
                        mount,
                        "-w".to_string(),
                        CONTAINER_WORKDIR.to_string(),
                        self.image.clone(),
                        "sleep".to_string(),
                        "infinity".to_string(),
                    ],
                    CREATE_TIMEOUT,
                )?;
            }
        }
        Ok(name)
    }

    /// Stop the container if it is running. Returns the state before the call.
    pub fn stop(&self, workspace: &Path) -> Result<ContainerState> {
        let state = self.state(workspace)?;
        if state == ContainerState::Running {
            let name = container_name(workspace)?;
            self.docker_checked(&["stop".to_string(), name], MANAGEMENT_TIMEOUT)?;
        }
        Ok(state)
    }

    /// Remove the container if it exists. Returns the state before the call.
    pub fn remove(&self, workspace: &Path) -> Result<ContainerState> {
        let state = self.state(workspace)?;
        if state != ContainerState::Missing {
            let name = container_name(workspace)?;
            self.docker_checked(
                &["rm".to_string(), "-f".to_string(), name],
                MANAGEMENT_TIMEOUT,
            )?;
        }
        Ok(state)
    }

    fn docker(&self, args: &[String], timeout: Duration) -> Result<CommandResult> {
        let mut cmd = Command::new(&self.docker_bin);
        cmd.args(args);
        let output = run_command_with_timeout(cmd, timeout, self.output_limit_bytes)
            .map_err(|err| {
                if is_spawn_not_found(&err) {
                    anyhow::Error::from(docker_missing(&self.docker_bin))
                } else {
                    err.context(format!("run {}", self.docker_bin))
                }
            })?;
        let command = format!("{} {}", self.docker_bin, args.join(" "));
        Ok(output.into_result(command))
    }

    fn docker_checked(&self, args: &[String], timeout: Duration) -> Result<CommandResult> {
        let result = self.docker(args, timeout)?;
        if !result.succeeded() {
            warn!(command = %result.command, exit_code = ?result.exit_code, "docker command failed");
            return Err(daemon_error(&result).into());
        }
        Ok(result)
    }
}

impl ContainerBackend for DockerBackend {
    fn name(&self) -> &'static str {
        "docker"
    }

    #[instrument(skip_all, fields(program = request.argv.first().map(String::as_str)))]
    fn execute(&self, request: &ExecRequest<'_>) -> Result<CommandResult> {
        if request.argv.is_empty() {
            return Err(anyhow!("empty command"));
        }
        let name = self.ensure_running(request.workspace)?;
        let args = exec_args(&name, request.argv, request.env);
        let mut result = self.docker(&args, request.timeout)?;
        if result.timed_out {
            // Only the docker client was killed. Kill the container so the
            // command stops too; `ensure_running` starts it again.
            warn!(container = %name, "command timed out; killing container");
            let kill = ["kill".to_string(), name];
            if let Err(err) = self.docker_checked(&kill, MANAGEMENT_TIMEOUT) {
                warn!(error = %format!("{err:#}"), "failed to kill container after timeout");
            }
        } else if let Some(err) = exec_failure(&result, &request.argv[0]) {
            return Err(err.into());
        }
        result.command = request.argv.join(" ");
        Ok(result)
    }
}

/// Map `docker exec` failures that never reached the requested program.
///
/// Exit 125 is a docker error. Exit 126/127 with an OCI runtime message means
/// the program is missing or not executable in the image. A plain 126/127
/// from a shell inside the container is an ordinary command result.
fn exec_failure(result: &CommandResult, program: &str) -> Option<ExternalToolError> {
    match result.exit_code {
        Some(125) => Some(daemon_error(result)),
        Some(126 | 127) => {
            let stderr = result.stderr.to_lowercase();
            let oci = stderr.contains("oci runtime")
                || stderr.contains("executable file not found")
                || stderr.contains("cannot exec");
            oci.then(|| {
                ExternalToolError::new(
                    program,
                    format!("cannot run in container: {}", result.stderr.trim()),
                    "install it in backend.image or change the command in .autogoals/config.toml",
                )
            })
        }
        _ => None,
    }
}

/// Build the backend selected by `config`.
pub fn backend_from_config(config: &RunnerConfig) -> Box<dyn ContainerBackend> {
    match config.backend.kind {
        BackendKind::Local => Box::new(LocalBackend::new(config.output_limit_bytes)),
        BackendKind::Docker => Box::new(DockerBackend::new(
            &config.backend,
            config.output_limit_bytes,
        )),
    }
}

impl<B: ContainerBackend + ?Sized> ContainerBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn execute(&self, request: &ExecRequest<'_>) -> Result<CommandResult> {
        (**self).execute(request)
    }
}

/// Deterministic container name: `autogoals-<slug>-<hash>`.
///
/// The slug is the sanitized last path component; the hash is the first
/// four bytes of the SHA-256 of the resolved path, hex encoded.
pub fn container_name(workspace: &Path) -> Result<String> {
    static UNSAFE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"[^a-z0-9_.-]+").expect("container slug pattern should be valid")
    });

    let abs = resolve_workspace(workspace)?;
    let base = abs
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let mut slug = UNSAFE.replace_all(&base, "-").trim_matches('-').to_string();
    slug.truncate(32);
    if slug.is_empty() {
        slug.push_str("workspace");
    }

    let mut hasher = Sha256::new();
    hasher.update(abs.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    Ok(format!("autogoals-{slug}-{}", hex::encode(&digest[..4])))
}

fn exec_args(name: &str, argv: &[String], env: &BTreeMap<String, String>) -> Vec<String> {
    let mut args = vec![
        "exec".to_string(),
        "-w".to_string(),
        CONTAINER_WORKDIR.to_string(),
    ];
    for (key, value) in env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
    args.push(name.to_string());
    args.extend(argv.iter().cloned());
    args
}

/// Canonical path when it exists (symlinks and `..` resolved), otherwise the
/// lexically absolute path.
fn resolve_workspace(path: &Path) -> Result<PathBuf> {
    match std::fs::canonicalize(path) {
        Ok(canonical) => Ok(canonical),
        Err(_) => std::path::absolute(path).with_context(|| format!("resolve {}", path.display())),
    }
}

fn is_missing_object(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("no such object") || lower.contains("no such container")
}

fn docker_missing(docker_bin: &str) -> ExternalToolError {
    ExternalToolError::new(
        "docker",
        format!("`{docker_bin}` not found on PATH"),
        "install Docker, set backend.docker_bin, or set backend.kind = \"local\" in .autogoals/config.toml",
    )
}

fn daemon_error(result: &CommandResult) -> ExternalToolError {
    ExternalToolError::new(
        "docker",
        format!(
            "`{}` failed ({}): {}",
            result.command,
            result
                .exit_code
                .map_or_else(|| "no exit code".to_string(), |code| format!("exit {code}")),
            result.stderr.trim()
        ),
        "make sure the Docker daemon is running and the current user can reach it",
    )
}
