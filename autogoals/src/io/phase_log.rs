//! Per-phase worker logs under `.autogoals/logs/<goal-id>/`.
//!
//! These are product artifacts: always written, unaffected by `RUST_LOG`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::types::{CommandResult, Phase};

#[derive(Debug, Clone)]
pub struct PhaseLogPaths {
    pub dir: PathBuf,
    pub log_path: PathBuf,
    pub prompt_path: PathBuf,
}

impl PhaseLogPaths {
    /// Paths for `phase` of `attempt` (1-indexed) inside a goal log dir.
    pub fn new(goal_dir: &Path, phase: Phase, attempt: u32) -> Self {
        Self {
            dir: goal_dir.to_path_buf(),
            log_path: goal_dir.join(format!("{attempt:02}-{phase}.log")),
            prompt_path: goal_dir.join(format!("{attempt:02}-{phase}.prompt.md")),
        }
    }
}

pub fn write_prompt(paths: &PhaseLogPaths, prompt: &str) -> Result<()> {
    create_dir(&paths.dir)?;
    fs::write(&paths.prompt_path, prompt)
        .with_context(|| format!("write prompt log {}", paths.prompt_path.display()))
}

/// Write every command result of a phase, in order.
pub fn write_phase_log(paths: &PhaseLogPaths, results: &[CommandResult]) -> Result<()> {
    create_dir(&paths.dir)?;
    let mut buf = String::new();
    for result in results {
        buf.push_str(&format!("=== command: {} ===\n", result.command));
        match result.exit_code {
            Some(code) => buf.push_str(&format!("exit code: {code}\n")),
            None => buf.push_str("exit code: none\n"),
        }
        if result.timed_out {
            buf.push_str("[timed out]\n");
        }
        buf.push_str("--- stdout ---\n");
        buf.push_str(&result.stdout);
        if !result.stdout.ends_with('\n') {
            buf.push('\n');
        }
        buf.push_str("--- stderr ---\n");
        buf.push_str(&result.stderr);
        if !result.stderr.ends_with('\n') {
            buf.push('\n');
        }
    }
    fs::write(&paths.log_path, buf)
        .with_context(|| format!("write phase log {}", paths.log_path.display()))
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create log dir {}", path.display()))
}
