//! Operator pause flag (`.autogoals/PAUSE`).
//!
//! The scheduler checks the flag between steps; a running worker is never
//! interrupted.

use std::fs;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use super::init::AutogoalsPaths;

pub fn is_paused(paths: &AutogoalsPaths) -> bool {
    paths.pause_path.exists()
}

/// Create the pause flag. Returns false if it was already set.
pub fn request_pause(paths: &AutogoalsPaths) -> Result<bool> {
    if is_paused(paths) {
        return Ok(false);
    }
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create directory {}", paths.dir.display()))?;
    fs::write(
        &paths.pause_path,
        format!("paused at {}\n", Utc::now().to_rfc3339()),
    )
    .with_context(|| format!("write {}", paths.pause_path.display()))?;
    info!("pause requested");
    Ok(true)
}

/// Remove the pause flag. Returns false if it was not set.
pub fn clear_pause(paths: &AutogoalsPaths) -> Result<bool> {
    if !is_paused(paths) {
        return Ok(false);
    }
    fs::remove_file(&paths.pause_path)
        .with_context(|| format!("remove {}", paths.pause_path.display()))?;
    info!("pause cleared");
    Ok(true)
}
