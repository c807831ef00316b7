//! Continuous Command Supervision
//!
//! A continuous module's command is expected to run for the whole session,
//! printing a line whenever its content changes. One supervisor task per
//! module owns the [`LineStream`], forwards lines to the scheduler loop and
//! restarts the command when it exits, backing off exponentially. After
//! too many consecutive failures it gives up and the module is marked
//! errored.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::process::{CommandRunner, LineStream};

/// Messages from a supervisor to the scheduler loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The command printed a line
    Line { index: usize, line: String },
    /// The command exited (or failed to start) and will be restarted
    Exited {
        index: usize,
        code: Option<i32>,
        failures: u32,
        restart_in: Duration,
    },
    /// Too many consecutive failures; no further restarts
    GaveUp { index: usize, failures: u32 },
}

/// Restart delays for a supervised command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    /// Consecutive failures tolerated before giving up
    pub max_restarts: u32,
}

impl Backoff {
    /// Delay before the restart following the `failures`-th consecutive failure
    pub fn delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    pub fn exhausted(&self, failures: u32) -> bool {
        failures > self.max_restarts
    }
}

/// Scheduler-side handle of a running supervisor
#[derive(Debug)]
pub struct SupervisorHandle {
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SupervisorHandle {
    /// Stop the supervisor and its command
    ///
    /// The command gets `grace` to exit after SIGTERM; if the supervisor
    /// still has not finished after `deadline` it is aborted, which drops
    /// the stream and SIGKILLs the process group.
    pub async fn stop(mut self, deadline: Duration) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if timeout(deadline, &mut self.task).await.is_err() {
            warn!("Stream supervisor did not stop in {:?}, aborting", deadline);
            self.task.abort();
            let _ = self.task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Supervises one continuous command
pub struct StreamSupervisor {
    index: usize,
    command: String,
    runner: Arc<dyn CommandRunner>,
    backoff: Backoff,
    grace: Duration,
    events: mpsc::UnboundedSender<StreamEvent>,
}

enum Drive {
    /// Output closed; carries the exit code
    Exited(Option<i32>),
    /// Cancelled, or the scheduler went away
    Stopped,
}

impl StreamSupervisor {
    pub fn new(
        index: usize,
        command: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
        backoff: Backoff,
        grace: Duration,
        events: mpsc::UnboundedSender<StreamEvent>,
    ) -> Self {
        Self {
            index,
            command: command.into(),
            runner,
            backoff,
            grace,
            events,
        }
    }

    /// Spawn the supervisor task
    pub fn spawn(self) -> SupervisorHandle {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(cancel_rx));
        SupervisorHandle {
            cancel: Some(cancel_tx),
            task,
        }
    }

    async fn run(self, mut cancel: oneshot::Receiver<()>) {
        let mut failures = 0u32;

        loop {
            let code = match self.runner.run_streaming(&self.command).await {
                Ok(stream) => {
                    debug!("Started '{}' (pid {:?})", self.command, stream.pid());
                    match self.drive(stream, &mut cancel, &mut failures).await {
                        Drive::Exited(code) => code,
                        Drive::Stopped => return,
                    }
                }
                Err(e) => {
                    warn!("Failed to start '{}': {}", self.command, e);
                    None
                }
            };

            failures += 1;
            if self.backoff.exhausted(failures) {
                error!(
                    "'{}' failed {} times in a row, giving up",
                    self.command, failures
                );
                let _ = self.events.send(StreamEvent::GaveUp {
                    index: self.index,
                    failures,
                });
                return;
            }

            let restart_in = self.backoff.delay(failures);
            info!(
                "'{}' exited with {:?}, restarting in {:?}",
                self.command, code, restart_in
            );
            let event = StreamEvent::Exited {
                index: self.index,
                code,
                failures,
                restart_in,
            };
            if self.events.send(event).is_err() {
                return;
            }

            tokio::select! {
                _ = &mut cancel => return,
                _ = sleep(restart_in) => {}
            }
        }
    }

    /// Forward lines until the command closes its output or we are stopped
    async fn drive(
        &self,
        mut stream: LineStream,
        cancel: &mut oneshot::Receiver<()>,
        failures: &mut u32,
    ) -> Drive {
        loop {
            tokio::select! {
                _ = &mut *cancel => {
                    stream.terminate(self.grace).await;
                    return Drive::Stopped;
                }
                line = stream.next_line() => match line {
                    Some(line) => {
                        *failures = 0;
                        let event = StreamEvent::Line { index: self.index, line };
                        if self.events.send(event).is_err() {
                            stream.terminate(self.grace).await;
                            return Drive::Stopped;
                        }
                    }
                    None => break,
                },
            }
        }

        tokio::select! {
            _ = &mut *cancel => {
                stream.terminate(self.grace).await;
                Drive::Stopped
            }
            code = stream.exit_status() => Drive::Exited(code),
        }
    }
}
