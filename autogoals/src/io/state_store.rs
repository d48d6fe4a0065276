//! Execution state storage (`.autogoals/execution_state.json`).
//!
//! Every save first copies the previous document to
//! `execution_state.json.bak`, then replaces the state file atomically.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::init::AutogoalsPaths;
use crate::core::invariants::validate_state_invariants;
use crate::error::StateCorruptionError;
use crate::goal::Goal;
use crate::state::ExecutionState;

#[derive(Debug, Clone)]
pub struct StateStore {
    state_path: PathBuf,
    backup_path: PathBuf,
}

impl StateStore {
    pub fn new(paths: &AutogoalsPaths) -> Self {
        Self {
            state_path: paths.state_path.clone(),
            backup_path: paths.backup_path.clone(),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn exists(&self) -> bool {
        self.state_path.exists()
    }

    pub fn backup_available(&self) -> bool {
        self.backup_path.is_file()
    }

    /// Load and validate the state document against `goals`.
    ///
    /// Returns `None` only when no state file exists. Unreadable documents
    /// and documents whose goal set differs from `goals` are
    /// [`StateCorruptionError`]s.
    pub fn load(&self, goals: &[Goal]) -> Result<Option<ExecutionState>> {
        if !self.exists() {
            debug!(path = %self.state_path.display(), "no execution state yet");
            return Ok(None);
        }
        let state = read_checked(&self.state_path, goals, self.backup_available())?;
        debug!(
            goals = state.goals_status.len(),
            events = state.execution_log.len(),
            "execution state loaded"
        );
        Ok(Some(state))
    }

    /// Load the existing state, or create and persist a fresh one.
    pub fn load_or_initialize(&self, goals: &[Goal]) -> Result<ExecutionState> {
        if let Some(state) = self.load(goals)? {
            return Ok(state);
        }
        let state = ExecutionState::initialize(goals);
        self.save(&state)?;
        info!(goals = goals.len(), "initialized execution state");
        Ok(state)
    }

    /// Persist `state`, rotating the previous document into the backup slot.
    ///
    /// A previous document that does not parse is left out of the rotation
    /// so a good backup is never replaced by a corrupt one.
    pub fn save(&self, state: &ExecutionState) -> Result<()> {
        if let Some(previous) = self.readable_previous()? {
            write_atomic(&self.backup_path, &previous)?;
        }
        let mut buf = serde_json::to_string_pretty(state).context("serialize execution state")?;
        buf.push('\n');
        write_atomic(&self.state_path, &buf)?;
        debug!(path = %self.state_path.display(), "execution state saved");
        Ok(())
    }

    /// Replace the state file with the validated backup.
    pub fn restore_from_backup(&self, goals: &[Goal]) -> Result<ExecutionState> {
        if !self.backup_available() {
            return Err(StateCorruptionError {
                path: self.backup_path.clone(),
                reason: "backup file does not exist".to_string(),
                backup_available: false,
            }
            .into());
        }
        let state = read_checked(&self.backup_path, goals, false)?;
        let mut buf = serde_json::to_string_pretty(&state).context("serialize execution state")?;
        buf.push('\n');
        write_atomic(&self.state_path, &buf)?;
        warn!(backup = %self.backup_path.display(), "restored execution state from backup");
        Ok(state)
    }

    /// Discard all progress and start from a fresh state.
    pub fn reinitialize(&self, goals: &[Goal]) -> Result<ExecutionState> {
        let state = ExecutionState::initialize(goals);
        self.save(&state)?;
        warn!(goals = goals.len(), "reinitialized execution state");
        Ok(state)
    }

    fn readable_previous(&self) -> Result<Option<String>> {
        if !self.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.state_path)
            .with_context(|| format!("read execution state {}", self.state_path.display()))?;
        if serde_json::from_str::<ExecutionState>(&contents).is_err() {
            warn!(path = %self.state_path.display(), "previous state unreadable, keeping existing backup");
            return Ok(None);
        }
        Ok(Some(contents))
    }
}

fn read_checked(path: &Path, goals: &[Goal], backup_available: bool) -> Result<ExecutionState> {
    let corrupt = |reason: String| StateCorruptionError {
        path: path.to_path_buf(),
        reason,
        backup_available,
    };
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read execution state {}", path.display()))?;
    let state: ExecutionState = serde_json::from_str(&contents)
        .map_err(|err| corrupt(format!("invalid JSON: {err}")))?;
    let errors = validate_state_invariants(goals, &state);
    if !errors.is_empty() {
        return Err(corrupt(errors.join("; ")).into());
    }
    Ok(state)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace state {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Phase;
    use crate::state::{EventKind, GoalState, LastError};
    use crate::test_support::{goal, ts};

    fn store(temp: &tempfile::TempDir) -> StateStore {
        StateStore::new(&AutogoalsPaths::new(temp.path()))
    }

    fn corruption(err: &anyhow::Error) -> &StateCorruptionError {
        err.downcast_ref::<StateCorruptionError>()
            .expect("state corruption error")
    }

    #[test]
    fn load_returns_none_without_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let goals = vec![goal("a", &[])];
        assert!(store(&temp).load(&goals).expect("load").is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store(&temp);
        let goals = vec![goal("a", &[]), goal("b", &["a"])];

        let mut state = ExecutionState::initialize(&goals);
        state.current_goal_id = Some("b".to_string());
        let status = state.goals_status.get_mut("a").expect("a");
        status.status = GoalState::Completed;
        status.started_at = Some(ts(10));
        status.completed_at = Some(ts(20));
        let status = state.goals_status.get_mut("b").expect("b");
        status.status = GoalState::ReadyForExecution;
        status.retry_count = 1;
        status.last_error = Some(LastError {
            command: "cargo test".to_string(),
            exit_code: Some(101),
            stdout: "out".to_string(),
            stderr: "err".to_string(),
            timestamp: ts(30),
        });
        state.record(ts(30), "b", EventKind::RetryScheduled, Phase::Verification.as_str());

        store.save(&state).expect("save");
        let loaded = store.load(&goals).expect("load").expect("state");
        assert_eq!(loaded, state);
    }

    #[test]
    fn save_rotates_previous_document_into_backup() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store(&temp);
        let goals = vec![goal("a", &[])];

        let first = ExecutionState::initialize(&goals);
        store.save(&first).expect("save first");
        assert!(!store.backup_available());

        let mut second = first.clone();
        second.goals_status.get_mut("a").expect("a").status = GoalState::ReadyForExecution;
        store.save(&second).expect("save second");

        assert!(store.backup_available());
        let restored = store.restore_from_backup(&goals).expect("restore");
        assert_eq!(restored, first);
        assert_eq!(store.load(&goals).expect("load"), Some(first));
    }

    #[test]
    fn invalid_json_is_corruption_with_backup_hint() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store(&temp);
        let goals = vec![goal("a", &[])];
        store.save(&ExecutionState::initialize(&goals)).expect("save");
        store.save(&ExecutionState::initialize(&goals)).expect("save again");
        fs::write(store.state_path(), "{ not json").expect("corrupt");

        let err = store.load(&goals).expect_err("corrupt");
        let corruption = corruption(&err);
        assert!(corruption.reason.contains("invalid JSON"));
        assert!(corruption.backup_available);
    }

    #[test]
    fn goal_set_mismatch_is_corruption() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store(&temp);
        store
            .save(&ExecutionState::initialize(&[goal("a", &[])]))
            .expect("save");

        let err = store
            .load(&[goal("a", &[]), goal("b", &[])])
            .expect_err("mismatch");
        assert!(corruption(&err).reason.contains("missing status for goal 'b'"));
    }

    #[test]
    fn corrupt_previous_does_not_replace_backup() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store(&temp);
        let goals = vec![goal("a", &[])];
        let good = ExecutionState::initialize(&goals);
        store.save(&good).expect("save");
        store.save(&good).expect("save");
        fs::write(store.state_path(), "garbage").expect("corrupt");

        store.reinitialize(&goals).expect("reinitialize");

        assert_eq!(store.restore_from_backup(&goals).expect("restore"), good);
    }

    #[test]
    fn restore_without_backup_fails() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = store(&temp)
            .restore_from_backup(&[goal("a", &[])])
            .expect_err("no backup");
        assert!(!corruption(&err).backup_available);
    }

    #[test]
    fn load_or_initialize_persists_fresh_state() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store(&temp);
        let goals = vec![goal("a", &[])];
        let state = store.load_or_initialize(&goals).expect("init");
        assert!(store.exists());
        assert_eq!(store.load(&goals).expect("load"), Some(state));
    }
}
