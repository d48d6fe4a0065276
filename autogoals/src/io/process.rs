//! Child processes with timeouts and bounded output capture.

use std::io::{ErrorKind, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::types::CommandResult;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Convert to the worker-facing result, appending truncation notices.
    pub fn into_result(self, command: impl Into<String>) -> CommandResult {
        let mut stdout = String::from_utf8_lossy(&self.stdout).into_owned();
        if self.stdout_truncated > 0 {
            stdout.push_str(&format!(
                "\n[stdout truncated {} bytes]\n",
                self.stdout_truncated
            ));
        }
        let mut stderr = String::from_utf8_lossy(&self.stderr).into_owned();
        if self.stderr_truncated > 0 {
            stderr.push_str(&format!(
                "\n[stderr truncated {} bytes]\n",
                self.stderr_truncated
            ));
        }
        if self.timed_out {
            stderr.push_str("\n[command timed out]\n");
        }
        CommandResult {
            command: command.into(),
            exit_code: if self.timed_out {
                None
            } else {
                self.status.code()
            },
            stdout,
            stderr,
            timed_out: self.timed_out,
        }
    }
}

/// Bytes kept from one stream, and how many were dropped past the limit.
#[derive(Debug, Default)]
struct Captured {
    kept: Vec<u8>,
    dropped: usize,
}

/// Spawn `cmd`, wait at most `timeout`, and capture both streams.
///
/// Both pipes are drained on reader threads while the child runs, so a chatty
/// child never blocks on a full pipe. At most `output_limit_bytes` per stream
/// are kept. Stdin is null. On timeout the child is killed and reaped.
#[instrument(skip_all, fields(program = ?cmd.get_program(), timeout_secs = timeout.as_secs()))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|err| {
        debug!(error = %err, "spawn failed");
        anyhow::Error::from(err).context(format!("spawn {}", cmd.get_program().to_string_lossy()))
    })?;
    let stdout = spawn_capture(child.stdout.take(), "stdout", output_limit_bytes)?;
    let stderr = spawn_capture(child.stderr.take(), "stderr", output_limit_bytes)?;

    let (status, timed_out) = match child.wait_timeout(timeout).context("wait for child")? {
        Some(status) => (status, false),
        None => {
            warn!("child exceeded its timeout, killing");
            child.kill().context("kill timed out child")?;
            (child.wait().context("reap killed child")?, true)
        }
    };

    let stdout = finish_capture(stdout, "stdout")?;
    let stderr = finish_capture(stderr, "stderr")?;
    if stdout.dropped > 0 || stderr.dropped > 0 {
        warn!(
            stdout_dropped = stdout.dropped,
            stderr_dropped = stderr.dropped,
            "output exceeded limit"
        );
    }
    debug!(exit_code = ?status.code(), timed_out, "child finished");

    Ok(CommandOutput {
        status,
        stdout: stdout.kept,
        stderr: stderr.kept,
        stdout_truncated: stdout.dropped,
        stderr_truncated: stderr.dropped,
        timed_out,
    })
}

/// Whether `err` came from spawning a program that does not exist.
pub fn is_spawn_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>()
        .is_some_and(|io| io.kind() == ErrorKind::NotFound)
}

type CaptureHandle = thread::JoinHandle<std::io::Result<Captured>>;

fn spawn_capture<R: Read + Send + 'static>(
    pipe: Option<R>,
    name: &str,
    limit: usize,
) -> Result<CaptureHandle> {
    let pipe = pipe.ok_or_else(|| anyhow!("{name} was not piped"))?;
    Ok(thread::spawn(move || capture(pipe, limit)))
}

fn finish_capture(handle: CaptureHandle, name: &str) -> Result<Captured> {
    handle
        .join()
        .map_err(|_| anyhow!("{name} reader panicked"))?
        .with_context(|| format!("read child {name}"))
}

fn capture<R: Read>(mut pipe: R, limit: usize) -> std::io::Result<Captured> {
    let mut out = Captured::default();
    let mut chunk = [0u8; 8192];
    loop {
        let n = pipe.read(&mut chunk)?;
        if n == 0 {
            return Ok(out);
        }
        let keep = n.min(limit.saturating_sub(out.kept.len()));
        out.kept.extend_from_slice(&chunk[..keep]);
        out.dropped += n - keep;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_exit_code_and_streams() {
        let output = run_command_with_timeout(
            sh("echo out; echo err >&2; exit 3"),
            Duration::from_secs(10),
            1000,
        )
        .expect("run");
        let result = output.into_result("script");
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
        assert!(!result.succeeded());
    }

    #[test]
    fn bounds_captured_output() {
        let output = run_command_with_timeout(
            sh("printf 'abcdefghij'"),
            Duration::from_secs(10),
            4,
        )
        .expect("run");
        assert_eq!(output.stdout, b"abcd");
        assert_eq!(output.stdout_truncated, 6);
        assert!(output.into_result("printf").stdout.contains("truncated 6 bytes"));
    }

    #[test]
    fn kills_on_timeout() {
        let output =
            run_command_with_timeout(sh("exec sleep 5"), Duration::from_millis(100), 1000)
                .expect("run");
        assert!(output.timed_out);
        let result = output.into_result("sleep");
        assert_eq!(result.exit_code, None);
        assert!(result.timed_out);
    }

    #[test]
    fn missing_program_is_detected() {
        let err = run_command_with_timeout(
            Command::new("autogoals-definitely-not-a-program"),
            Duration::from_secs(1),
            10,
        )
        .expect_err("spawn fails");
        assert!(is_spawn_not_found(&err));
    }
}
