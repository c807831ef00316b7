//! Line Streams
//!
//! A [`LineStream`] is the consumer side of a long-running command: a lazy
//! sequence of output lines plus the command's exit status. Lines arrive
//! as soon as the child flushes them. Disconnecting (dropping the stream)
//! kills the process group; [`LineStream::terminate`] does the same
//! gracefully.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use super::signals::ProcessGroup;

/// Lines buffered between the reader task and the consumer
///
/// A full buffer stalls the child's writes rather than dropping lines.
pub const LINE_BUFFER: usize = 64;

/// Output lines of a running command
pub struct LineStream {
    command: String,
    lines: mpsc::Receiver<String>,
    exit: Option<oneshot::Receiver<Option<i32>>>,
    exit_code: Option<Option<i32>>,
    group: Option<ProcessGroup>,
}

impl LineStream {
    /// Build a stream from raw channels, without a backing process
    ///
    /// Used by runners that produce lines from something other than a
    /// child process (and by test doubles).
    pub fn from_channels(
        command: impl Into<String>,
        lines: mpsc::Receiver<String>,
        exit: oneshot::Receiver<Option<i32>>,
    ) -> Self {
        Self {
            command: command.into(),
            lines,
            exit: Some(exit),
            exit_code: None,
            group: None,
        }
    }

    /// Start reading `child`'s stdout
    ///
    /// The child must have been spawned with a piped stdout and as the
    /// leader of its own process group.
    pub(crate) fn from_child(command: impl Into<String>, mut child: Child, pid: u32) -> Self {
        let command = command.into();
        let (line_tx, line_rx) = mpsc::channel(LINE_BUFFER);
        let (exit_tx, exit_rx) = oneshot::channel();
        let stdout = child.stdout.take();
        let task_command = command.clone();

        tokio::spawn(async move {
            if let Some(stdout) = stdout {
                pump_lines(&task_command, stdout, line_tx).await;
            }
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!("Failed to reap '{}': {}", task_command, e);
                    None
                }
            };
            debug!("Stream command '{}' exited with {:?}", task_command, code);
            let _ = exit_tx.send(code);
        });

        Self {
            group: Some(ProcessGroup::new(pid, command.clone())),
            command,
            lines: line_rx,
            exit: Some(exit_rx),
            exit_code: None,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Process group id of the backing process, if any
    pub fn pid(&self) -> Option<u32> {
        self.group.as_ref().map(ProcessGroup::id)
    }

    /// Next output line, or `None` once the command closed its output
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Wait for the command to exit and return its exit code
    ///
    /// `None` when the command was killed by a signal or its status could
    /// not be collected.
    pub async fn exit_status(&mut self) -> Option<i32> {
        if let Some(code) = self.exit_code {
            return code;
        }
        let code = match self.exit.take() {
            Some(rx) => rx.await.unwrap_or(None),
            None => None,
        };
        self.exit_code = Some(code);
        if let Some(group) = self.group.as_mut() {
            // the leader is reaped; sweep anything it left behind
            group.kill();
        }
        code
    }

    /// Stop the command: close our end, SIGTERM the group, SIGKILL after `grace`
    pub async fn terminate(mut self, grace: Duration) {
        self.lines.close();
        if let Some(mut group) = self.group.take() {
            if let Err(e) = group.terminate_gracefully(grace).await {
                warn!("Terminating '{}': {}", self.command, e);
            }
        }
        if let Some(rx) = self.exit.take() {
            let _ = timeout(grace, rx).await;
        }
    }
}

impl Stream for LineStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.lines.poll_recv(cx)
    }
}

impl std::fmt::Debug for LineStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineStream")
            .field("command", &self.command)
            .field("pid", &self.pid())
            .finish()
    }
}

/// Forward lines from `reader` until EOF, a read error, or the consumer leaving
async fn pump_lines<R>(command: &str, reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                if tx.send(line).await.is_err() {
                    trace!("Consumer of '{}' disconnected", command);
                    break;
                }
            }
            Err(e) => {
                warn!("Reading output of '{}' failed: {}", command, e);
                break;
            }
        }
    }
}
