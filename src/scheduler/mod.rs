//! Module scheduling engine
//!
//! [`Engine`] is the handle the rest of the program holds. Starting it
//! turns the configured module specs into instances, spawns the scheduler
//! loop that owns them and exposes:
//!
//! - the [`ModuleStateStore`] the render layer reads
//! - input: click/scroll dispatch, refresh requests, signal refreshes
//! - lifecycle: [`Engine::shutdown`] and [`Engine::reload`]

mod central;
pub mod instance;
pub mod supervisor;

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::actions::{ActionDispatcher, DispatchOutcome};
use crate::config::{Config, EngineSettings, Layout};
use crate::error::{Error, Result};
use crate::models::{EventKind, ModuleSpec};
use crate::process::CommandRunner;
use crate::sources::SourceRegistry;
use crate::store::ModuleStateStore;

use central::Scheduler;
pub use instance::{ModuleInstance, Producer};
pub use supervisor::{Backoff, StreamEvent, SupervisorHandle};

/// Requests handled by the scheduler loop
#[derive(Debug)]
pub(crate) enum Control {
    /// Poll a module now
    Refresh { module: String },
    /// Switch a module between `format` and `format-alt`
    ToggleAlt { module: String },
    /// Refresh every module listening on this `SIGRTMIN` offset
    Signal(i32),
    Shutdown { done: oneshot::Sender<()> },
}

/// Running module engine
pub struct Engine {
    control: mpsc::UnboundedSender<Control>,
    store: Arc<ModuleStateStore>,
    actions: ActionDispatcher,
    layout: Layout,
    settings: EngineSettings,
    runner: Arc<dyn CommandRunner>,
    sources: SourceRegistry,
    task: JoinHandle<()>,
}

impl Engine {
    /// Start the modules placed by `config`
    ///
    /// Modules whose configuration is invalid, or built-ins with no
    /// registered data source, are logged and left out.
    pub fn start(
        config: &Config,
        runner: Arc<dyn CommandRunner>,
        sources: SourceRegistry,
    ) -> Result<Self> {
        Self::launch(
            config.module_specs(),
            config.layout(),
            config.engine.clone(),
            runner,
            sources,
        )
    }

    /// Start an explicit list of modules, all placed on the left
    pub fn with_modules(
        specs: Vec<ModuleSpec>,
        settings: EngineSettings,
        runner: Arc<dyn CommandRunner>,
        sources: SourceRegistry,
    ) -> Result<Self> {
        let layout = Layout {
            left: specs.iter().map(|spec| spec.id.clone()).collect(),
            ..Layout::default()
        };
        Self::launch(specs, layout, settings, runner, sources)
    }

    fn launch(
        specs: Vec<ModuleSpec>,
        layout: Layout,
        settings: EngineSettings,
        runner: Arc<dyn CommandRunner>,
        sources: SourceRegistry,
    ) -> Result<Self> {
        tokio::runtime::Handle::try_current()
            .map_err(|_| Error::Other("the engine must be started inside a tokio runtime".into()))?;

        let mut instances = Vec::with_capacity(specs.len());
        for spec in specs {
            if instances.iter().any(|inst: &ModuleInstance| inst.id() == spec.id) {
                continue;
            }
            match build_instance(spec, &sources) {
                Ok(instance) => instances.push(instance),
                Err(e) => warn!("Skipping module: {}", e),
            }
        }

        let store = Arc::new(ModuleStateStore::new(
            instances.iter().map(|inst| inst.id().to_string()),
        ));
        let specs: HashMap<String, Arc<ModuleSpec>> = instances
            .iter()
            .map(|inst| (inst.id().to_string(), Arc::clone(&inst.spec)))
            .collect();

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let actions = ActionDispatcher::new(
            specs,
            Arc::clone(&store),
            Arc::clone(&runner),
            control_tx.clone(),
            settings.action_timeout,
        );

        let scheduler = Scheduler::new(
            instances,
            Arc::clone(&runner),
            Arc::clone(&store),
            settings.clone(),
            control_rx,
        );
        let task = tokio::spawn(scheduler.run());

        Ok(Self {
            control: control_tx,
            store,
            actions,
            layout,
            settings,
            runner,
            sources,
            task,
        })
    }

    /// Latest render state of every module
    pub fn store(&self) -> Arc<ModuleStateStore> {
        Arc::clone(&self.store)
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Deliver a click or scroll to a module
    ///
    /// Never blocks on the action's command.
    pub fn dispatch(&self, module: &str, kind: EventKind) -> DispatchOutcome {
        self.actions.dispatch(module, kind)
    }

    /// Poll a module now, outside its interval
    pub fn refresh(&self, module: &str) -> Result<()> {
        if !self.store.contains(module) {
            return Err(Error::ModuleNotFound {
                module: module.to_string(),
            });
        }
        self.send(Control::Refresh {
            module: module.to_string(),
        })
    }

    /// Handle `SIGRTMIN + offset`: refresh the modules listening on it
    pub fn signal(&self, offset: i32) -> Result<()> {
        self.send(Control::Signal(offset))
    }

    fn send(&self, control: Control) -> Result<()> {
        self.control.send(control).map_err(|_| Error::EngineStopped)
    }

    /// Stop every module and wait for their processes to go away
    ///
    /// Continuous commands get `shutdown-grace` between SIGTERM and SIGKILL;
    /// in-flight polls and actions are killed.
    pub async fn shutdown(self) -> Result<()> {
        self.actions.shutdown().await;

        let (done_tx, done_rx) = oneshot::channel();
        if self.control.send(Control::Shutdown { done: done_tx }).is_ok() {
            let _ = done_rx.await;
        }
        drop(self.control);

        self.task
            .await
            .map_err(|e| Error::Other(format!("scheduler task failed: {}", e)))
    }

    /// Shut down and start again with a new configuration
    pub async fn reload(self, config: &Config) -> Result<Engine> {
        let runner = Arc::clone(&self.runner);
        let sources = self.sources.clone();
        self.shutdown().await?;
        info!("Restarting engine with reloaded config");
        Engine::start(config, runner, sources)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("modules", &self.store.module_ids())
            .field("settings", &self.settings)
            .finish()
    }
}

/// Resolve how a spec produces content
fn build_instance(spec: ModuleSpec, sources: &SourceRegistry) -> Result<ModuleInstance> {
    match spec.builtin_name() {
        Some(name) => {
            let source = sources.get(name).ok_or_else(|| Error::SourceNotFound {
                module: spec.id.clone(),
            })?;
            let trigger = spec.builtin_trigger(source.default_interval());
            Ok(ModuleInstance::new(spec, trigger, Producer::Source(source)))
        }
        None => {
            let trigger = spec.trigger();
            let producer = match &spec.exec {
                Some(command) => Producer::Command(command.clone()),
                None => Producer::Static,
            };
            Ok(ModuleInstance::new(spec, trigger, producer))
        }
    }
}
