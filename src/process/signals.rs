//! Process Group Signal Handling
//!
//! Every command the engine runs is placed in its own process group so a
//! single signal reaches the shell and everything it started. A
//! [`ProcessGroup`] is a guard over that group: dropping it kills whatever
//! is still alive.

use std::time::Duration;

use nix::sys::signal::{killpg, Signal as NixSignal};
use nix::unistd::Pid;
use tokio::time::{sleep, Instant};

use crate::error::{Error, Result};

/// Polling step while waiting for a group to exit
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Signal types that can be sent to a process group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Termination signal (graceful shutdown)
    Terminate,
    /// Kill signal (forceful termination)
    Kill,
}

impl Signal {
    fn to_nix(self) -> NixSignal {
        match self {
            Signal::Terminate => NixSignal::SIGTERM,
            Signal::Kill => NixSignal::SIGKILL,
        }
    }
}

/// Guard over the process group led by a spawned command
#[derive(Debug)]
pub struct ProcessGroup {
    pgid: u32,
    command: String,
    armed: bool,
}

impl ProcessGroup {
    /// Take ownership of the group led by `pid`
    pub fn new(pid: u32, command: impl Into<String>) -> Self {
        Self {
            pgid: pid,
            command: command.into(),
            armed: true,
        }
    }

    /// Process group id (the leader's pid)
    pub fn id(&self) -> u32 {
        self.pgid
    }

    /// Send a signal to every process in the group
    pub fn signal(&self, signal: Signal) -> Result<()> {
        killpg(Pid::from_raw(self.pgid as i32), signal.to_nix()).map_err(|e| {
            Error::SignalSendFailed {
                signal: format!("{:?}", signal),
                reason: e.to_string(),
            }
        })
    }

    /// Whether any process (zombies included) is left in the group
    pub fn is_alive(&self) -> bool {
        killpg(Pid::from_raw(self.pgid as i32), None).is_ok()
    }

    /// SIGTERM, wait up to `grace`, then SIGKILL whatever remains
    ///
    /// Returns once the group is gone or the post-kill wait also expires.
    pub async fn terminate_gracefully(&mut self, grace: Duration) -> Result<()> {
        self.armed = false;

        if self.signal(Signal::Terminate).is_err() {
            // ESRCH: the group is already gone
            return Ok(());
        }
        if wait_until_gone(self, grace).await {
            return Ok(());
        }

        warn!(
            "Process group {} ('{}') ignored SIGTERM for {:?}, killing",
            self.pgid, self.command, grace
        );
        let _ = self.signal(Signal::Kill);
        if wait_until_gone(self, grace).await {
            Ok(())
        } else {
            Err(Error::SignalSendFailed {
                signal: "Kill".to_string(),
                reason: format!("process group {} still alive after SIGKILL", self.pgid),
            })
        }
    }

    /// Kill the group right away
    pub fn kill(&mut self) {
        self.armed = false;
        if let Err(e) = self.signal(Signal::Kill) {
            trace!("Kill of process group {} skipped: {}", self.pgid, e);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if self.armed {
            self.kill();
        }
    }
}

async fn wait_until_gone(group: &ProcessGroup, limit: Duration) -> bool {
    let deadline = Instant::now().checked_add(limit);
    while deadline.map_or(true, |at| Instant::now() < at) {
        if !group.is_alive() {
            return true;
        }
        sleep(EXIT_POLL_INTERVAL).await;
    }
    !group.is_alive()
}
