//! modbar - module execution and scheduling engine for desktop status panels
//!
//! A status panel is a row of small modules: a clock, a media player
//! indicator, a launcher button. Most of them are driven by user scripts.
//! This library runs those scripts on the right schedule, turns their
//! output into render-ready state and routes clicks back to them. Drawing
//! the panel is left to whatever consumes the [`store::ModuleStateStore`].
//!
//! ## Module Organization
//!
//! - [`config`] - Config file loading (JSON with comments, or TOML), layout,
//!   engine settings, file watching
//! - [`models`] - Module specs, render state, event kinds, format icons
//! - [`output`] - Output protocol parsing and label formatting
//! - [`process`] - Shell command execution, line streams, process groups
//! - [`scheduler`] - The [`Engine`]: triggers, gating, restart policy,
//!   shutdown
//! - [`actions`] - Click and scroll dispatch
//! - [`store`] - Latest render state per module, change notifications
//! - [`sources`] - Built-in data sources (clock)
//! - [`mod@error`] - Error types and Result aliases
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use modbar::{ConfigLoader, Engine, ShellRunner, SourceRegistry};
//!
//! # async fn run() -> modbar::Result<()> {
//! let (_path, config) = ConfigLoader::load()?;
//! let engine = Engine::start(&config, Arc::new(ShellRunner::new()), SourceRegistry::with_defaults())?;
//!
//! let mut events = engine.store().events().subscribe();
//! while let Some(event) = events.recv().await {
//!     if let Some(state) = engine.store().get(event.module()) {
//!         println!("{}: {}", event.module(), state.label);
//!     }
//! }
//! engine.shutdown().await
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **Scheduler task:** owns every module instance; the only writer of
//!   module state
//! - **Poll tasks:** one per in-flight interval poll or `exec-if` gate
//! - **Stream supervisors:** one per continuous module, restarting its
//!   command with exponential backoff
//! - **Action tasks:** fire-and-forget click/scroll commands
//!
//! Communication happens via `tokio::mpsc` channels; readers see state
//! through per-module `tokio::sync::watch` slots.
//!
//! ## Platform Support
//!
//! Unix only: commands run through `/bin/sh` in their own process group,
//! and refresh signals are real-time signals.

#![allow(unexpected_cfgs)]

#[cfg(not(unix))]
compile_error!("modbar relies on Unix process groups and real-time signals");

#[macro_use]
extern crate tracing;

pub mod actions;
pub mod config;
pub mod error;
pub mod models;
pub mod output;
pub mod process;
pub mod scheduler;
pub mod sources;
pub mod store;

// Re-exports for core functionality
pub use actions::DispatchOutcome;
pub use config::loader::ConfigLoader;
pub use config::watcher::ConfigWatcher;
pub use config::{Config, EngineSettings, Layout};
pub use error::{Error, Result};
pub use models::{EventKind, ModuleSpec, RenderState};
pub use process::{CommandRunner, ShellRunner};
pub use scheduler::Engine;
pub use sources::{DataSource, SourceRegistry};
pub use store::{ModuleStateStore, ModuleStatus};

// Version information
/// The current version of modbar from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The application name from Cargo.toml
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// The application description from Cargo.toml
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
