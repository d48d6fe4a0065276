//! Dependency-aware goal scheduler that drives an external coding agent.
//!
//! Goals are declared in `goals.yaml`, scheduled in dependency order, and
//! carried through `planning → execution → verification` one at a time, with
//! per-goal state persisted in `.autogoals/execution_state.json`.
//!
//! - **[`core`]**: Pure, deterministic logic (dependency ordering, selection,
//!   state transitions, progress). No I/O.
//! - **[`io`]**: Side-effecting operations (goal file, state store, process
//!   execution, container backend, agent worker).
//!
//! Orchestration modules ([`scheduler`], [`looping`], [`status`], [`manage`],
//! [`recover`], [`watch`], [`validate`]) coordinate core logic with I/O to
//! implement CLI commands.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod goal;
pub mod io;
pub mod logging;
pub mod looping;
pub mod manage;
pub mod recover;
pub mod scheduler;
pub mod state;
pub mod status;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
pub mod watch;
