//! Module State Store
//!
//! The latest [`RenderState`] of every module, read by the render layer.
//!
//! ## Locking
//!
//! The set of modules is fixed when the store is built, so the slot map
//! itself is never written after construction. Each slot is a
//! `tokio::sync::watch` channel with its own lock: publishing module A
//! never blocks a reader or writer of module B.

pub mod events;

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

use crate::models::RenderState;

pub use events::{StoreEvent, StoreEventBus, StoreSubscription};

/// Lifecycle status of a module instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    /// Waiting for its `exec-if` gate
    Gating,
    /// Running normally
    Active,
    /// Gate failed; inert for the rest of the session
    Disabled,
    /// Gave up after repeated failures; keeps its last state
    Errored,
    /// Engine shut down
    Stopped,
}

impl ModuleStatus {
    /// Whether click and scroll actions should reach the module
    ///
    /// Errored modules keep their display, so they keep their bindings too.
    pub fn accepts_input(&self) -> bool {
        matches!(self, ModuleStatus::Active | ModuleStatus::Errored)
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleStatus::Gating => "gating",
            ModuleStatus::Active => "active",
            ModuleStatus::Disabled => "disabled",
            ModuleStatus::Errored => "errored",
            ModuleStatus::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Contents of one slot
#[derive(Debug, Clone)]
pub struct SlotState {
    pub status: ModuleStatus,
    /// Latest render state; `None` before the first update and for disabled modules
    pub render: Option<Arc<RenderState>>,
}

impl SlotState {
    fn new() -> Self {
        Self {
            status: ModuleStatus::Gating,
            render: None,
        }
    }
}

/// Latest render state per module
pub struct ModuleStateStore {
    order: Vec<String>,
    slots: HashMap<String, watch::Sender<SlotState>>,
    events: StoreEventBus,
}

impl ModuleStateStore {
    /// Build a store with one slot per module, in render order
    pub fn new<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut order = Vec::new();
        let mut slots = HashMap::new();
        for id in modules {
            let id = id.into();
            if slots.contains_key(&id) {
                continue;
            }
            let (tx, _rx) = watch::channel(SlotState::new());
            slots.insert(id.clone(), tx);
            order.push(id);
        }
        Self {
            order,
            slots,
            events: StoreEventBus::default(),
        }
    }

    /// Module identifiers in render order
    pub fn module_ids(&self) -> &[String] {
        &self.order
    }

    pub fn contains(&self, module: &str) -> bool {
        self.slots.contains_key(module)
    }

    /// Latest render state of a module
    pub fn get(&self, module: &str) -> Option<Arc<RenderState>> {
        self.slots.get(module)?.borrow().render.clone()
    }

    pub fn status(&self, module: &str) -> Option<ModuleStatus> {
        self.slots.get(module).map(|slot| slot.borrow().status)
    }

    /// Copy of a module's slot
    pub fn slot(&self, module: &str) -> Option<SlotState> {
        self.slots.get(module).map(|slot| slot.borrow().clone())
    }

    /// Watch a single module's slot
    pub fn subscribe(&self, module: &str) -> Option<watch::Receiver<SlotState>> {
        self.slots.get(module).map(watch::Sender::subscribe)
    }

    /// Change notifications for all modules
    pub fn events(&self) -> &StoreEventBus {
        &self.events
    }

    /// Every slot in render order
    pub fn snapshot(&self) -> Vec<(String, SlotState)> {
        self.order
            .iter()
            .filter_map(|id| self.slot(id).map(|slot| (id.clone(), slot)))
            .collect()
    }

    /// Publish a new render state
    ///
    /// Ignored for unknown and disabled modules.
    pub(crate) fn publish(&self, module: &str, state: RenderState) -> Option<Arc<RenderState>> {
        let slot = self.slots.get(module)?;
        let state = Arc::new(state);
        let mut published = false;
        slot.send_if_modified(|current| {
            if current.status == ModuleStatus::Disabled {
                return false;
            }
            current.render = Some(Arc::clone(&state));
            published = true;
            true
        });
        if !published {
            return None;
        }
        trace!("{}: published '{}'", module, state.label);
        self.events.publish(StoreEvent::Updated {
            module: module.to_string(),
        });
        Some(state)
    }

    /// Change a module's status
    ///
    /// Disabling clears the render state so the module is never drawn.
    pub(crate) fn set_status(&self, module: &str, status: ModuleStatus) {
        let Some(slot) = self.slots.get(module) else {
            return;
        };
        let changed = slot.send_if_modified(|current| {
            if current.status == status {
                return false;
            }
            current.status = status;
            if status == ModuleStatus::Disabled {
                current.render = None;
            }
            true
        });
        if changed {
            self.events.publish(StoreEvent::StatusChanged {
                module: module.to_string(),
                status,
            });
        }
    }
}

impl fmt::Debug for ModuleStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleStateStore")
            .field("modules", &self.order)
            .finish()
    }
}
