//! Deterministic, pure logic shared by the scheduler.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod dependency;
pub mod invariants;
pub mod progress;
pub mod selector;
pub mod state_update;
pub mod types;
