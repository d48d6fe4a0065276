//! I/O adapters for scheduler commands.

pub mod backend;
pub mod config;
pub mod control;
pub mod goals_file;
pub mod init;
pub mod phase_log;
pub mod process;
pub mod prompt;
pub mod state_store;
pub mod worker;
