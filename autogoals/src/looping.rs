//! Multi-step loop for `autogoals start` and `autogoals resume`.

use anyhow::Result;
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::core::selector::{BlockedReport, blocked_report};
use crate::core::state_update::recover_interrupted;
use crate::io::control::is_paused;
use crate::io::state_store::StateStore;
use crate::io::worker::Worker;
use crate::scheduler::{StepOutcome, run_step};
use crate::validate::Project;

/// Reason why `run_loop` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// Every goal is completed.
    Complete,
    /// Nothing is eligible, but some goals failed or wait on failed goals.
    Blocked(BlockedReport),
    /// The pause flag was set between steps.
    Paused,
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub steps_executed: u32,
    pub stop: LoopStop,
    /// Goals found `in_progress` at startup and scheduled again.
    pub recovered: Vec<String>,
}

/// Run steps until no goal is eligible or the pause flag appears.
///
/// Goals left `in_progress` by an interrupted process are moved back to
/// `ready_for_execution` before the first step. Any step error stops the loop.
#[instrument(skip_all, fields(root = %project.paths.root.display()))]
pub fn run_loop<W: Worker, F: FnMut(&StepOutcome)>(
    project: &Project,
    worker: &W,
    mut on_step: F,
) -> Result<LoopOutcome> {
    let store = StateStore::new(&project.paths);
    let mut state = store.load_or_initialize(project.goals())?;

    let recovered = recover_interrupted(&mut state, Utc::now());
    if !recovered.is_empty() {
        warn!(goals = ?recovered, "rescheduled interrupted goals");
        store.save(&state)?;
    }

    let mut steps_executed = 0u32;
    loop {
        if is_paused(&project.paths) {
            info!(steps_executed, "pause requested");
            return Ok(LoopOutcome {
                steps_executed,
                stop: LoopStop::Paused,
                recovered,
            });
        }

        match run_step(project, &store, &mut state, worker)? {
            Some(step) => {
                steps_executed += 1;
                on_step(&step);
            }
            None => {
                let report = blocked_report(project.goals(), &state);
                let stop = if report.is_clean() {
                    LoopStop::Complete
                } else {
                    LoopStop::Blocked(report)
                };
                info!(steps_executed, ?stop, "loop finished");
                return Ok(LoopOutcome {
                    steps_executed,
                    stop,
                    recovered,
                });
            }
        }
    }
}
