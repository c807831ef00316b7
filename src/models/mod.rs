//! Core data models for modbar
//!
//! Module specifications as loaded from the config, the pointer events
//! they bind, icon tables, and the render snapshots the engine publishes.

pub mod event_kind;
pub mod icons;
pub mod module_spec;
pub mod render_state;

// Re-exports for convenience
pub use event_kind::{ActionBindings, EventKind};
pub use icons::{FormatIcons, StateKey};
pub use module_spec::{Interval, ModuleKind, ModuleSpec, RawModuleSpec, ReturnType, Trigger};
pub use render_state::{RenderState, Sample, ERROR_CLASS};
