//! Stable exit codes for the `autogoals` CLI.

/// Command succeeded: all goals completed, or the loop paused cleanly.
pub const OK: i32 = 0;
/// Invalid goal file, dependency graph, config, or any other error.
pub const INVALID: i32 = 1;
/// The loop stopped with failed or blocked goals.
pub const FAILED: i32 = 2;
/// The execution state is corrupt; see `autogoals recover`.
pub const CORRUPT_STATE: i32 = 3;
/// A required external tool (agent CLI, docker) is unavailable.
pub const EXTERNAL_TOOL: i32 = 4;
