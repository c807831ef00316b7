//! Process execution and supervision
//!
//! This module provides everything the engine needs to run external
//! commands:
//!
//! - **Runner**: one-shot capture and line streaming through a shell
//! - **Streams**: the consumer side of a long-running command
//! - **Signals**: process-group termination with a grace period
//!
//! ## Process groups
//!
//! Commands are spawned as leaders of their own process group. Timeouts,
//! cancellation and shutdown signal the whole group, so grandchildren
//! started by a script (`a | b`, `cmd &`) never outlive it.

pub mod runner;
pub mod signals;
pub mod streams;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

// Re-exports for convenience
pub use runner::ShellRunner;
pub use signals::{ProcessGroup, Signal};
pub use streams::LineStream;

/// Captured result of a successful one-shot command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Everything the command wrote to stdout
    pub stdout: String,
    /// Wall time from spawn to exit
    pub duration: Duration,
}

/// Executes module, gate and action commands
///
/// The scheduler only talks to this trait, so it can be driven by a test
/// double instead of real processes.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion, capturing stdout
    ///
    /// Fails on spawn error, nonzero exit, or when `timeout` expires (in
    /// which case the process group is killed).
    async fn run_once(&self, command: &str, timeout: Duration) -> Result<CommandOutput>;

    /// Start a long-running command and stream its output lines
    async fn run_streaming(&self, command: &str) -> Result<LineStream>;
}
