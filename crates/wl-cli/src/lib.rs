//! Worklog CLI library.
//!
//! This crate provides the CLI interface for the task time tracker.

mod cli;
pub mod commands;
mod config;

pub use cli::{AddArgs, Cli, Commands, EditArgs, ListArgs, SummaryArgs};
pub use config::{Backend, Config, DEFAULT_OWNER, RemoteSettings};
