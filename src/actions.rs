//! Action Dispatch
//!
//! Maps click and scroll events onto a module's bound commands. Dispatch
//! returns immediately: commands run in background tasks with their own
//! deadline, and their output is discarded. When the module has
//! `exec-on-event` set, it is refreshed once its action finishes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::models::{EventKind, ModuleSpec, Trigger};
use crate::process::CommandRunner;
use crate::scheduler::Control;
use crate::store::ModuleStateStore;

/// What a dispatched event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The bound command was started
    Fired,
    /// Left click switched between `format` and `format-alt`
    ToggledAlt,
    /// Nothing bound to this event
    Unbound,
    /// Module is gating, disabled or stopped
    Inactive,
    UnknownModule,
}

/// Runs action commands for the engine
#[derive(Clone)]
pub struct ActionDispatcher {
    specs: Arc<HashMap<String, Arc<ModuleSpec>>>,
    store: Arc<ModuleStateStore>,
    runner: Arc<dyn CommandRunner>,
    control: mpsc::UnboundedSender<Control>,
    timeout: Duration,
    inflight: Arc<Mutex<JoinSet<()>>>,
    /// Runtime actions are spawned on; dispatch may come from another thread
    runtime: Handle,
}

impl ActionDispatcher {
    pub(crate) fn new(
        specs: HashMap<String, Arc<ModuleSpec>>,
        store: Arc<ModuleStateStore>,
        runner: Arc<dyn CommandRunner>,
        control: mpsc::UnboundedSender<Control>,
        timeout: Duration,
    ) -> Self {
        Self {
            specs: Arc::new(specs),
            store,
            runner,
            control,
            timeout,
            inflight: Arc::new(Mutex::new(JoinSet::new())),
            runtime: Handle::current(),
        }
    }

    /// Deliver `kind` to `module`
    pub fn dispatch(&self, module: &str, kind: EventKind) -> DispatchOutcome {
        let Some(spec) = self.specs.get(module) else {
            debug!("{} on unknown module '{}'", kind, module);
            return DispatchOutcome::UnknownModule;
        };

        let status = self.store.status(module);
        if !status.is_some_and(|status| status.accepts_input()) {
            debug!("{}: ignoring {} while {:?}", module, kind, status);
            return DispatchOutcome::Inactive;
        }

        if kind == EventKind::ClickLeft && spec.toggles_alt_on_click() {
            let _ = self.control.send(Control::ToggleAlt {
                module: module.to_string(),
            });
            return DispatchOutcome::ToggledAlt;
        }

        let Some(command) = spec.actions.get(kind) else {
            trace!("{}: nothing bound to {}", module, kind);
            return DispatchOutcome::Unbound;
        };

        let refresh = spec.exec_on_event && spec.trigger() != Trigger::Continuous;
        self.spawn_action(module.to_string(), command.to_string(), refresh);
        DispatchOutcome::Fired
    }

    fn spawn_action(&self, module: String, command: String, refresh: bool) {
        let runner = Arc::clone(&self.runner);
        let control = self.control.clone();
        let deadline = self.timeout;

        let mut inflight = self.lock_inflight();
        // reap finished actions
        while inflight.try_join_next().is_some() {}

        info!("{}: running action '{}'", module, command);
        let action = async move {
            if let Err(e) = runner.run_once(&command, deadline).await {
                warn!("{}: action '{}' failed: {}", module, command, e);
            }
            if refresh {
                let _ = control.send(Control::Refresh { module });
            }
        };
        inflight.spawn_on(action, &self.runtime);
    }

    /// Kill every running action
    pub async fn shutdown(&self) {
        let mut running = std::mem::take(&mut *self.lock_inflight());
        if !running.is_empty() {
            debug!("Aborting {} running actions", running.len());
        }
        running.shutdown().await;
    }

    fn lock_inflight(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.inflight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ActionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDispatcher")
            .field("modules", &self.specs.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}
