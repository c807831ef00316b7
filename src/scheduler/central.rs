//! Scheduler Loop
//!
//! A single task owns every [`ModuleInstance`] and is the only writer of
//! their state. Everything else talks to it through channels:
//!
//! - [`Control`] messages from the engine handle and the action dispatcher
//! - [`StreamEvent`]s from continuous-command supervisors
//! - completed gate and poll tasks from a `JoinSet`
//! - the earliest interval deadline
//!
//! Polls run as tasks so a slow command never delays another module; the
//! per-instance `busy` flag keeps at most one poll per module in flight.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{Id, JoinSet};
use tokio::time::{sleep_until, timeout, Instant};

use super::instance::{ModuleInstance, Producer};
use super::supervisor::{Backoff, StreamEvent, StreamSupervisor};
use super::Control;
use crate::config::EngineSettings;
use crate::error::{Error, Result};
use crate::models::{RenderState, Sample, Trigger};
use crate::output::OutputParser;
use crate::process::CommandRunner;
use crate::store::{ModuleStateStore, ModuleStatus};

/// Result of a task spawned by the loop
enum TaskResult {
    Gate { index: usize, result: Result<()> },
    Poll { index: usize, outcome: PollOutcome },
}

enum PollOutcome {
    Output(Result<String>),
    Sample(Result<Sample>),
}

pub(crate) struct Scheduler {
    instances: Vec<ModuleInstance>,
    index: HashMap<String, usize>,
    runner: Arc<dyn CommandRunner>,
    store: Arc<ModuleStateStore>,
    settings: EngineSettings,
    control: mpsc::UnboundedReceiver<Control>,
    stream_tx: mpsc::UnboundedSender<StreamEvent>,
    stream_rx: mpsc::UnboundedReceiver<StreamEvent>,
    tasks: JoinSet<TaskResult>,
    /// Instance each running task belongs to
    task_owner: HashMap<Id, usize>,
}

impl Scheduler {
    pub(crate) fn new(
        instances: Vec<ModuleInstance>,
        runner: Arc<dyn CommandRunner>,
        store: Arc<ModuleStateStore>,
        settings: EngineSettings,
        control: mpsc::UnboundedReceiver<Control>,
    ) -> Self {
        let index = instances
            .iter()
            .enumerate()
            .map(|(i, inst)| (inst.id().to_string(), i))
            .collect();
        let (stream_tx, stream_rx) = mpsc::unbounded_channel();
        Self {
            instances,
            index,
            runner,
            store,
            settings,
            control,
            stream_tx,
            stream_rx,
            tasks: JoinSet::new(),
            task_owner: HashMap::new(),
        }
    }

    /// Run until shut down
    pub(crate) async fn run(mut self) {
        self.start_all();

        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                control = self.control.recv() => match control {
                    Some(Control::Shutdown { done }) => {
                        self.shutdown().await;
                        let _ = done.send(());
                        return;
                    }
                    Some(control) => self.handle_control(control),
                    None => {
                        debug!("Engine handle dropped, shutting down");
                        self.shutdown().await;
                        return;
                    }
                },
                Some(event) = self.stream_rx.recv() => self.handle_stream(event),
                Some(joined) = self.tasks.join_next_with_id(), if !self.tasks.is_empty() => {
                    match joined {
                        Ok((id, result)) => {
                            self.task_owner.remove(&id);
                            self.handle_task(result);
                        }
                        Err(e) => self.handle_task_panic(e.id(), e.to_string()),
                    }
                }
                _ = sleep_until_deadline(deadline) => self.fire_due(Instant::now()),
            }
        }
    }

    fn start_all(&mut self) {
        info!("Starting {} modules", self.instances.len());
        for index in 0..self.instances.len() {
            match self.instances[index].spec.exec_if.clone() {
                Some(gate) => self.spawn_gate(index, gate),
                None => self.enable(index),
            }
        }
    }

    fn spawn_gate(&mut self, index: usize, gate: String) {
        let runner = Arc::clone(&self.runner);
        let deadline = self.settings.exec_timeout;
        debug!("{}: checking exec-if '{}'", self.instances[index].id(), gate);
        let handle = self.tasks.spawn(async move {
            let result = runner.run_once(&gate, deadline).await.map(|_| ());
            TaskResult::Gate { index, result }
        });
        self.task_owner.insert(handle.id(), index);
    }

    /// Activate a module and start its trigger
    fn enable(&mut self, index: usize) {
        let now = Instant::now();
        let inst = &mut self.instances[index];
        inst.status = ModuleStatus::Active;
        self.store.set_status(&inst.spec.id, ModuleStatus::Active);

        match inst.trigger {
            Trigger::Interval(period) => {
                debug!("{}: polling every {:?}", inst.spec.id, period);
                inst.next_tick = Some(now);
            }
            Trigger::Continuous => self.start_stream(index),
            Trigger::EventOnly => {
                if matches!(inst.producer, Producer::Static) || inst.spec.polls_at_start() {
                    self.start_poll(index);
                }
            }
        }
    }

    fn disable(&mut self, index: usize, reason: &Error) {
        let inst = &mut self.instances[index];
        info!("{}: exec-if failed ({}), module disabled", inst.spec.id, reason);
        inst.status = ModuleStatus::Disabled;
        inst.next_tick = None;
        inst.last_state = None;
        self.store.set_status(&inst.spec.id, ModuleStatus::Disabled);
    }

    fn start_stream(&mut self, index: usize) {
        let inst = &mut self.instances[index];
        let Producer::Command(command) = &inst.producer else {
            return;
        };
        let backoff = Backoff {
            base: inst.spec.restart_interval.unwrap_or(self.settings.restart_backoff),
            max: self.settings.restart_backoff_max,
            max_restarts: self.settings.max_restarts,
        };
        let supervisor = StreamSupervisor::new(
            index,
            command.clone(),
            Arc::clone(&self.runner),
            backoff,
            self.settings.shutdown_grace,
            self.stream_tx.clone(),
        );
        inst.stream = Some(supervisor.spawn());
    }

    /// Start a poll unless one is already in flight
    ///
    /// A refresh that lands on a busy module is remembered and runs once
    /// the current poll finishes.
    fn start_poll(&mut self, index: usize) {
        let inst = &mut self.instances[index];
        if inst.busy {
            inst.pending_refresh = true;
            return;
        }

        let deadline = self.settings.exec_timeout;
        let handle = match inst.producer.clone() {
            Producer::Static => {
                let state = OutputParser::new(&inst.spec).render_static(inst.alt_format);
                self.publish(index, state);
                return;
            }
            Producer::Command(command) => {
                inst.begin_run();
                let runner = Arc::clone(&self.runner);
                self.tasks.spawn(async move {
                    let output = runner.run_once(&command, deadline).await;
                    TaskResult::Poll {
                        index,
                        outcome: PollOutcome::Output(output.map(|out| out.stdout)),
                    }
                })
            }
            Producer::Source(source) => {
                inst.begin_run();
                let spec = Arc::clone(&inst.spec);
                self.tasks.spawn(async move {
                    let sample = match timeout(deadline, source.sample(&spec)).await {
                        Ok(sample) => sample,
                        Err(_) => Err(Error::CommandTimeout {
                            command: spec.id.clone(),
                            duration: deadline,
                        }),
                    };
                    TaskResult::Poll {
                        index,
                        outcome: PollOutcome::Sample(sample),
                    }
                })
            }
        };
        self.task_owner.insert(handle.id(), index);
    }

    fn publish(&mut self, index: usize, state: RenderState) {
        let inst = &mut self.instances[index];
        if let Some(published) = self.store.publish(&inst.spec.id, state) {
            inst.last_state = Some(published);
        }
    }

    /// Republish the last state flagged stale
    fn mark_stale(&mut self, index: usize) {
        let stale = match &self.instances[index].last_state {
            Some(last) if !last.stale => last.mark_stale(),
            _ => return,
        };
        self.publish(index, stale);
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.instances
            .iter()
            .filter(|inst| inst.is_active())
            .filter_map(|inst| inst.next_tick)
            .min()
    }

    fn fire_due(&mut self, now: Instant) {
        for index in 0..self.instances.len() {
            let inst = &mut self.instances[index];
            if !inst.tick_due(now) {
                continue;
            }
            inst.advance_tick(now);
            if inst.busy {
                inst.skipped_ticks += 1;
                debug!(
                    "{}: previous poll still running, skipping tick ({} skipped)",
                    inst.spec.id, inst.skipped_ticks
                );
                continue;
            }
            self.start_poll(index);
        }
    }

    fn handle_control(&mut self, control: Control) {
        match control {
            Control::Refresh { module } => match self.index.get(&module) {
                Some(&index) => self.refresh(index),
                None => debug!("Refresh for unknown module '{}'", module),
            },
            Control::ToggleAlt { module } => match self.index.get(&module) {
                Some(&index) => self.toggle_alt(index),
                None => debug!("Toggle for unknown module '{}'", module),
            },
            Control::Signal(offset) => {
                let targets: Vec<usize> = self
                    .instances
                    .iter()
                    .enumerate()
                    .filter(|(_, inst)| inst.spec.signal == Some(offset))
                    .map(|(index, _)| index)
                    .collect();
                if targets.is_empty() {
                    debug!("No module listens on signal offset {}", offset);
                }
                for index in targets {
                    self.refresh(index);
                }
            }
            // handled by the loop
            Control::Shutdown { .. } => {}
        }
    }

    fn refresh(&mut self, index: usize) {
        let inst = &self.instances[index];
        if !inst.is_active() {
            debug!("{}: not active ({}), ignoring refresh", inst.spec.id, inst.status);
            return;
        }
        if inst.trigger == Trigger::Continuous {
            debug!("{}: continuous module, ignoring refresh", inst.spec.id);
            return;
        }
        self.start_poll(index);
    }

    fn toggle_alt(&mut self, index: usize) {
        let inst = &mut self.instances[index];
        let shown = matches!(inst.status, ModuleStatus::Active | ModuleStatus::Errored);
        if !shown || inst.spec.format_alt.is_none() {
            return;
        }
        inst.alt_format = !inst.alt_format;
        debug!("{}: alternate format {}", inst.spec.id, inst.alt_format);

        let parser = OutputParser::new(&inst.spec);
        let state = match (&inst.last_state, &inst.producer) {
            (_, Producer::Static) => parser.render_static(inst.alt_format),
            (Some(last), _) => parser.relabel(last, inst.alt_format),
            (None, _) => return,
        };
        self.publish(index, state);
    }

    fn handle_stream(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Line { index, line } => {
                let inst = &mut self.instances[index];
                if !inst.is_active() {
                    return;
                }
                inst.consecutive_failures = 0;
                let state = OutputParser::new(&inst.spec).parse(&line, inst.alt_format);
                self.publish(index, state);
            }
            StreamEvent::Exited {
                index,
                code,
                failures,
                restart_in,
            } => {
                let inst = &mut self.instances[index];
                inst.consecutive_failures = failures;
                debug!(
                    "{}: stream exited with {:?}, restart {} in {:?}",
                    inst.spec.id, code, failures, restart_in
                );
                self.mark_stale(index);
            }
            StreamEvent::GaveUp { index, failures } => {
                let inst = &mut self.instances[index];
                inst.consecutive_failures = failures;
                inst.stream = None;
                if inst.is_active() {
                    warn!("{}: marked errored after {} failures", inst.spec.id, failures);
                    inst.status = ModuleStatus::Errored;
                    self.store.set_status(&inst.spec.id, ModuleStatus::Errored);
                }
                self.mark_stale(index);
            }
        }
    }

    fn handle_task(&mut self, result: TaskResult) {
        match result {
            TaskResult::Gate { index, result } => match result {
                Ok(()) => {
                    debug!("{}: exec-if passed", self.instances[index].id());
                    self.enable(index);
                }
                Err(e) => self.disable(index, &e),
            },
            TaskResult::Poll { index, outcome } => {
                let inst = &mut self.instances[index];
                inst.busy = false;
                if !inst.is_active() {
                    return;
                }

                let parser = OutputParser::new(&inst.spec);
                let state = match outcome {
                    PollOutcome::Output(Ok(stdout)) => {
                        inst.consecutive_failures = 0;
                        parser.parse(&stdout, inst.alt_format)
                    }
                    PollOutcome::Sample(Ok(sample)) => {
                        inst.consecutive_failures = 0;
                        parser.render(sample, inst.alt_format)
                    }
                    PollOutcome::Output(Err(e)) | PollOutcome::Sample(Err(e)) => {
                        inst.consecutive_failures += 1;
                        if e.is_transient() {
                            warn!("{}: poll failed: {}", inst.spec.id, e);
                        } else {
                            error!("{}: poll failed: {}", inst.spec.id, e);
                        }
                        parser.failure(&e)
                    }
                };
                self.publish(index, state);

                let inst = &mut self.instances[index];
                if inst.pending_refresh {
                    inst.pending_refresh = false;
                    self.start_poll(index);
                }
            }
        }
    }

    /// A gate or poll task panicked
    fn handle_task_panic(&mut self, id: Id, reason: String) {
        let Some(index) = self.task_owner.remove(&id) else {
            return;
        };
        let inst = &mut self.instances[index];
        error!("{}: task failed: {}", inst.spec.id, reason);
        match inst.status {
            ModuleStatus::Gating => self.disable(index, &Error::Other(reason)),
            _ => {
                inst.busy = false;
                inst.consecutive_failures += 1;
                self.publish(index, RenderState::failed());
            }
        }
    }

    /// Stop every stream and in-flight task
    async fn shutdown(&mut self) {
        let grace = self.settings.shutdown_grace;
        info!("Shutting down {} modules", self.instances.len());

        // TERM, grace, KILL, then up to another grace for the exit status
        let deadline = grace.saturating_mul(2).saturating_add(Duration::from_millis(100));
        let stops: Vec<_> = self
            .instances
            .iter_mut()
            .filter_map(|inst| inst.stream.take())
            .map(|handle| handle.stop(deadline))
            .collect();
        futures::future::join_all(stops).await;

        // aborting a poll drops its process group guard, which kills it
        self.tasks.shutdown().await;
        self.task_owner.clear();

        for inst in &mut self.instances {
            inst.busy = false;
            inst.next_tick = None;
            inst.status = ModuleStatus::Stopped;
            self.store.set_status(&inst.spec.id, ModuleStatus::Stopped);
        }
        info!("All modules stopped");
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
