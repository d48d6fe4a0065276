//! `autogoals recover`: explicit operator repair of a corrupt state file.

use anyhow::Result;
use tracing::instrument;

use crate::io::state_store::StateStore;
use crate::state::ExecutionState;
use crate::validate::Project;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverMode {
    /// Replace the state file with the last good backup.
    FromBackup,
    /// Discard all progress.
    Reinitialize,
}

#[instrument(skip_all, fields(mode = ?mode))]
pub fn recover_state(project: &Project, mode: RecoverMode) -> Result<ExecutionState> {
    let store = StateStore::new(&project.paths);
    match mode {
        RecoverMode::FromBackup => store.restore_from_backup(project.goals()),
        RecoverMode::Reinitialize => store.reinitialize(project.goals()),
    }
}
