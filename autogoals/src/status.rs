//! Read-only status report for `autogoals status` and `autogoals watch`.

use std::fmt::Write as _;

use anyhow::Result;

use crate::core::progress::{Progress, progress};
use crate::core::selector::has_pending_work;
use crate::io::control::is_paused;
use crate::io::state_store::StateStore;
use crate::state::{ExecutionState, LastError};
use crate::validate::Project;

const SUMMARY_WIDTH: usize = 72;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    pub id: String,
    pub title: String,
    pub label: &'static str,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub project_name: String,
    pub rows: Vec<StatusRow>,
    pub progress: Progress,
    pub current_goal_id: Option<String>,
    pub paused: bool,
    /// Whether any goal is still active or in progress.
    pub pending_work: bool,
    /// False when no state file exists yet; rows then show fresh statuses.
    pub persisted: bool,
}

/// Build the report without writing anything.
pub fn build_status(project: &Project) -> Result<StatusReport> {
    let store = StateStore::new(&project.paths);
    let (state, persisted) = match store.load(project.goals())? {
        Some(state) => (state, true),
        None => (ExecutionState::initialize(project.goals()), false),
    };
    Ok(report_from(project, &state, persisted))
}

fn report_from(project: &Project, state: &ExecutionState, persisted: bool) -> StatusReport {
    let rows = project
        .goals()
        .iter()
        .filter_map(|goal| {
            let status = state.goals_status.get(&goal.id)?;
            Some(StatusRow {
                id: goal.id.clone(),
                title: goal.title().to_string(),
                label: status.display_label(),
                retry_count: status.retry_count,
                max_retries: goal.max_retries,
                last_error: status.last_error.as_ref().map(summarize_error),
            })
        })
        .collect();
    StatusReport {
        project_name: project.goals_file.project_name.clone(),
        rows,
        progress: progress(project.goals(), state),
        current_goal_id: state.current_goal_id.clone(),
        paused: is_paused(&project.paths),
        pending_work: has_pending_work(state),
        persisted,
    }
}

/// One-line summary: command, exit code, and the first non-empty output line.
pub fn summarize_error(error: &LastError) -> String {
    let code = match error.exit_code {
        Some(code) => format!("exit {code}"),
        None => "no exit code".to_string(),
    };
    let line = error
        .stderr
        .lines()
        .chain(error.stdout.lines())
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");
    let mut out = format!("{} ({code})", error.command);
    if !line.is_empty() {
        out.push_str(": ");
        out.push_str(line);
    }
    truncate_chars(&out, SUMMARY_WIDTH)
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

/// Plain-text table.
pub fn render_status(report: &StatusReport) -> String {
    let mut out = String::new();
    let name = if report.project_name.trim().is_empty() {
        "autogoals"
    } else {
        report.project_name.as_str()
    };
    let p = report.progress;
    let _ = writeln!(
        out,
        "{name}: {}/{} completed ({}%), {} in flight, {} pending, {} failed",
        p.completed,
        p.total,
        p.percent_complete(),
        p.in_flight,
        p.pending,
        p.failed
    );
    if !report.persisted {
        let _ = writeln!(out, "no execution state yet; run `autogoals start`");
    }
    if let Some(current) = &report.current_goal_id {
        let _ = writeln!(out, "current goal: {current}");
    }
    if !report.pending_work && p.failed > 0 {
        let _ = writeln!(out, "nothing left to run; reset or skip failed goals to continue");
    }
    if report.paused {
        let _ = writeln!(out, "paused: run `autogoals resume` to continue");
    }
    out.push('\n');

    let id_width = column_width(report.rows.iter().map(|row| row.id.as_str()), "ID");
    let label_width = column_width(report.rows.iter().map(|row| row.label), "STATUS");
    let _ = writeln!(
        out,
        "{:<id_width$}  {:<label_width$}  {:<7}  TITLE",
        "ID", "STATUS", "RETRIES"
    );
    for row in &report.rows {
        let retries = format!("{}/{}", row.retry_count, row.max_retries);
        let _ = writeln!(
            out,
            "{:<id_width$}  {:<label_width$}  {:<7}  {}",
            row.id, row.label, retries, row.title
        );
        if let Some(error) = &row.last_error {
            let _ = writeln!(out, "{:<id_width$}  last error: {error}", "");
        }
    }
    out
}

fn column_width<'a>(values: impl Iterator<Item = &'a str>, header: &str) -> usize {
    values
        .map(|value| value.chars().count())
        .chain(std::iter::once(header.len()))
        .max()
        .unwrap_or(header.len())
}
