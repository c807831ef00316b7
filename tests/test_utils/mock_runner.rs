//! Mock Command Runner for Testing
//!
//! Commands are looked up in a script table instead of being executed.
//! Delays use `tokio::time`, so tests running on a paused clock see exact
//! timings.

use async_trait::async_trait;
use modbar::error::{Error, Result};
use modbar::process::{CommandOutput, CommandRunner, LineStream};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Instant};

/// Scripted behavior of one command
#[derive(Debug, Clone)]
pub enum Script {
    /// Succeed with `stdout` after `delay`
    Output { stdout: String, delay: Duration },
    /// Exit with `code` after `delay`
    Fail { code: i32, delay: Duration },
    /// Stream `lines` (each after its delay), then exit after `exit_after`
    Stream {
        lines: Vec<(Duration, String)>,
        exit_after: Duration,
        code: Option<i32>,
    },
    /// Refuse to start
    SpawnError,
}

impl Script {
    pub fn output(stdout: &str) -> Self {
        Script::Output {
            stdout: stdout.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn slow(stdout: &str, delay: Duration) -> Self {
        Script::Output {
            stdout: stdout.to_string(),
            delay,
        }
    }

    pub fn fail(code: i32) -> Self {
        Script::Fail {
            code,
            delay: Duration::ZERO,
        }
    }

    /// Stream lines immediately, then exit with `code`
    pub fn lines(lines: &[&str], code: Option<i32>) -> Self {
        Script::Stream {
            lines: lines
                .iter()
                .map(|line| (Duration::ZERO, line.to_string()))
                .collect(),
            exit_after: Duration::ZERO,
            code,
        }
    }

    /// Stream lines and never exit
    pub fn endless(lines: &[&str]) -> Self {
        Script::Stream {
            lines: lines
                .iter()
                .map(|line| (Duration::ZERO, line.to_string()))
                .collect(),
            exit_after: Duration::from_secs(24 * 3600),
            code: None,
        }
    }
}

/// Kind of invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Once,
    Streaming,
}

/// One recorded invocation
#[derive(Debug, Clone)]
pub struct Call {
    pub command: String,
    pub kind: CallKind,
    pub at: Instant,
}

#[derive(Default)]
struct State {
    queued: HashMap<String, VecDeque<Script>>,
    persistent: HashMap<String, Script>,
    calls: Vec<Call>,
    running: HashMap<String, usize>,
    max_running: HashMap<String, usize>,
}

/// Scripted [`CommandRunner`]
#[derive(Clone, Default)]
pub struct MockRunner {
    state: Arc<Mutex<State>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Behavior used every time `command` runs
    pub fn on(&self, command: &str, script: Script) -> &Self {
        self.state
            .lock()
            .unwrap()
            .persistent
            .insert(command.to_string(), script);
        self
    }

    /// Behavior for the next run of `command` only, ahead of [`MockRunner::on`]
    pub fn then(&self, command: &str, script: Script) -> &Self {
        self.state
            .lock()
            .unwrap()
            .queued
            .entry(command.to_string())
            .or_default()
            .push_back(script);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of times `command` was started
    pub fn count(&self, command: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| call.command == command)
            .count()
    }

    /// Start instants of `command`
    pub fn starts(&self, command: &str) -> Vec<Instant> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| call.command == command)
            .map(|call| call.at)
            .collect()
    }

    /// Highest number of concurrent one-shot runs of `command`
    pub fn max_concurrent(&self, command: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .max_running
            .get(command)
            .copied()
            .unwrap_or(0)
    }

    fn record(&self, command: &str, kind: CallKind) -> Option<Script> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call {
            command: command.to_string(),
            kind,
            at: Instant::now(),
        });
        let queued = state
            .queued
            .get_mut(command)
            .and_then(|queue| queue.pop_front());
        queued.or_else(|| state.persistent.get(command).cloned())
    }

    fn enter(&self, command: &str) {
        let mut state = self.state.lock().unwrap();
        let running = {
            let running = state.running.entry(command.to_string()).or_insert(0);
            *running += 1;
            *running
        };
        let max = state.max_running.entry(command.to_string()).or_insert(0);
        *max = (*max).max(running);
    }

    fn leave(&self, command: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(running) = state.running.get_mut(command) {
            *running = running.saturating_sub(1);
        }
    }
}

/// Decrements the running count even when the run is cancelled
struct RunGuard<'a> {
    runner: &'a MockRunner,
    command: &'a str,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.runner.leave(self.command);
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run_once(&self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        let script = self.record(command, CallKind::Once);
        self.enter(command);
        let _guard = RunGuard {
            runner: self,
            command,
        };

        let (delay, outcome) = match script {
            Some(Script::Output { stdout, delay }) => (delay, Ok(stdout)),
            Some(Script::Fail { code, delay }) => (delay, Err(Some(code))),
            Some(Script::SpawnError) | None => {
                return Err(Error::CommandSpawnFailed {
                    command: command.to_string(),
                    reason: "no script".to_string(),
                })
            }
            Some(Script::Stream { .. }) => (Duration::ZERO, Ok(String::new())),
        };

        if delay > timeout {
            sleep(timeout).await;
            return Err(Error::CommandTimeout {
                command: command.to_string(),
                duration: timeout,
            });
        }
        sleep(delay).await;

        match outcome {
            Ok(stdout) => Ok(CommandOutput {
                stdout,
                duration: delay,
            }),
            Err(code) => Err(Error::CommandFailed {
                command: command.to_string(),
                code,
            }),
        }
    }

    async fn run_streaming(&self, command: &str) -> Result<LineStream> {
        let script = self.record(command, CallKind::Streaming);
        let (lines, exit_after, code) = match script {
            Some(Script::Stream {
                lines,
                exit_after,
                code,
            }) => (lines, exit_after, code),
            Some(Script::Output { stdout, delay }) => {
                (vec![(delay, stdout)], Duration::ZERO, Some(0))
            }
            Some(Script::Fail { code, delay }) => (Vec::new(), delay, Some(code)),
            Some(Script::SpawnError) | None => {
                return Err(Error::CommandSpawnFailed {
                    command: command.to_string(),
                    reason: "no script".to_string(),
                })
            }
        };

        let (line_tx, line_rx) = mpsc::channel(16);
        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(async move {
            for (delay, line) in lines {
                sleep(delay).await;
                if line_tx.send(line).await.is_err() {
                    break;
                }
            }
            drop(line_tx);
            sleep(exit_after).await;
            let _ = exit_tx.send(code);
        });

        Ok(LineStream::from_channels(command, line_rx, exit_rx))
    }
}
