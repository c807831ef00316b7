//! Shell command execution
//!
//! Runs module commands through `/bin/sh -c` so `~`, `$VAR`, pipes and
//! `&&` behave as they do in the user's shell. Every child leads its own
//! process group; no return path leaves a process from that group alive.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::{timeout, Instant};

use super::signals::ProcessGroup;
use super::streams::LineStream;
use super::{CommandOutput, CommandRunner};
use crate::error::{Error, Result};

/// Shell used when none is configured
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Runs commands through a POSIX shell
#[derive(Debug, Clone)]
pub struct ShellRunner {
    /// Shell executable
    shell: PathBuf,
    /// Extra environment variables for every command
    env_vars: HashMap<String, String>,
    /// Working directory (defaults to the user's home)
    working_dir: Option<PathBuf>,
}

impl ShellRunner {
    /// Create a runner using [`DEFAULT_SHELL`] from the user's home directory
    pub fn new() -> Self {
        Self {
            shell: PathBuf::from(DEFAULT_SHELL),
            env_vars: HashMap::new(),
            working_dir: dirs::home_dir(),
        }
    }

    /// Use a different shell executable
    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Set environment variable
    pub fn set_env(&mut self, key: String, value: String) {
        self.env_vars.insert(key, value);
    }

    fn command(&self, command: &str) -> Result<Command> {
        if command.trim().is_empty() {
            return Err(Error::EmptyCommand);
        }
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .envs(&self.env_vars)
            .stdin(Stdio::null())
            .process_group(0)
            .kill_on_drop(true);
        if let Some(dir) = self.working_dir.as_ref().filter(|dir| dir.is_dir()) {
            cmd.current_dir(dir);
        }
        Ok(cmd)
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run_once(&self, command: &str, limit: Duration) -> Result<CommandOutput> {
        let started = Instant::now();
        let mut child = self
            .command(command)?
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::CommandSpawnFailed {
                command: command.to_string(),
                reason: e.to_string(),
            })?;

        let pid = child.id().ok_or_else(|| Error::NoPidAvailable {
            command: command.to_string(),
        })?;
        // killed on every return path, including cancellation of this future
        let _group = ProcessGroup::new(pid, command);

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let collect = async move {
            let (out, err, status) =
                tokio::join!(read_all(stdout), read_all(stderr), child.wait());
            status.map(|status| (out, err, status))
        };

        let (stdout, stderr, status) = match timeout(limit, collect).await {
            Ok(result) => result?,
            Err(_) => {
                debug!("'{}' timed out after {:?}, killing group {}", command, limit, pid);
                return Err(Error::CommandTimeout {
                    command: command.to_string(),
                    duration: limit,
                });
            }
        };

        if !stderr.trim().is_empty() {
            debug!("'{}' stderr: {}", command, stderr.trim_end());
        }

        if status.success() {
            Ok(CommandOutput {
                stdout,
                duration: started.elapsed(),
            })
        } else {
            Err(Error::CommandFailed {
                command: command.to_string(),
                code: status.code(),
            })
        }
    }

    async fn run_streaming(&self, command: &str) -> Result<LineStream> {
        let mut child = self
            .command(command)?
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| Error::CommandSpawnFailed {
                command: command.to_string(),
                reason: e.to_string(),
            })?;

        let pid = match child.id() {
            Some(pid) => pid,
            None => {
                let _ = child.start_kill();
                return Err(Error::NoPidAvailable {
                    command: command.to_string(),
                });
            }
        };

        debug!("Streaming '{}' (pid {})", command, pid);
        Ok(LineStream::from_child(command, child, pid))
    }
}

async fn read_all<R>(reader: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        if let Err(e) = reader.read_to_end(&mut buf).await {
            trace!("Output read stopped early: {}", e);
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
