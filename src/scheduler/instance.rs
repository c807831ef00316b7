//! Module Instance
//!
//! Runtime bookkeeping for one configured module. Instances are owned by
//! the scheduler loop and never shared, so none of this needs locking.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::supervisor::SupervisorHandle;
use crate::models::{ModuleSpec, RenderState, Trigger};
use crate::sources::DataSource;
use crate::store::ModuleStatus;

/// How an instance produces content
#[derive(Clone)]
pub enum Producer {
    /// Run `exec` through the command runner
    Command(String),
    /// Sample a built-in data source
    Source(Arc<dyn DataSource>),
    /// Nothing to run; the label is the format itself
    Static,
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Producer::Command(cmd) => f.debug_tuple("Command").field(cmd).finish(),
            Producer::Source(_) => f.write_str("Source"),
            Producer::Static => f.write_str("Static"),
        }
    }
}

/// Runtime state of one module
#[derive(Debug)]
pub struct ModuleInstance {
    pub spec: Arc<ModuleSpec>,
    pub trigger: Trigger,
    pub producer: Producer,
    pub status: ModuleStatus,
    /// A poll is in flight
    pub busy: bool,
    /// Refresh requested while busy; runs once the poll completes
    pub pending_refresh: bool,
    /// Next interval tick
    pub next_tick: Option<Instant>,
    pub last_state: Option<Arc<RenderState>>,
    pub last_run: Option<DateTime<Utc>>,
    pub runs: u64,
    /// Ticks dropped because the previous poll was still running
    pub skipped_ticks: u64,
    pub consecutive_failures: u32,
    /// `format-alt` toggled on
    pub alt_format: bool,
    /// Supervisor of a continuous command
    pub stream: Option<SupervisorHandle>,
}

impl ModuleInstance {
    pub fn new(spec: ModuleSpec, trigger: Trigger, producer: Producer) -> Self {
        Self {
            spec: Arc::new(spec),
            trigger,
            producer,
            status: ModuleStatus::Gating,
            busy: false,
            pending_refresh: false,
            next_tick: None,
            last_state: None,
            last_run: None,
            runs: 0,
            skipped_ticks: 0,
            consecutive_failures: 0,
            alt_format: false,
            stream: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn is_active(&self) -> bool {
        self.status == ModuleStatus::Active
    }

    /// Whether an interval tick is due at `now`
    pub fn tick_due(&self, now: Instant) -> bool {
        self.is_active() && self.next_tick.is_some_and(|at| at <= now)
    }

    /// Move `next_tick` past `now` on the period grid
    ///
    /// Missed ticks are dropped rather than replayed. A tick that falls
    /// beyond what `Instant` can represent is never scheduled.
    pub fn advance_tick(&mut self, now: Instant) {
        let (Trigger::Interval(period), Some(at)) = (self.trigger, self.next_tick) else {
            return;
        };
        if at > now {
            return;
        }
        let step = period.as_nanos();
        if step == 0 {
            warn!("{}: zero interval, polling stopped", self.spec.id);
            self.next_tick = None;
            return;
        }
        let missed = now.duration_since(at).as_nanos() / step + 1;
        self.next_tick = u64::try_from(step * missed)
            .ok()
            .and_then(|jump| at.checked_add(Duration::from_nanos(jump)));
        if self.next_tick.is_none() {
            debug!("{}: next tick is out of range, polling stopped", self.spec.id);
        }
    }

    /// Mark a poll as started
    pub fn begin_run(&mut self) {
        self.busy = true;
        self.runs += 1;
        self.last_run = Some(Utc::now());
    }
}
