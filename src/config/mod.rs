//! Configuration management for modbar
//!
//! The config file is a JSON object (comments allowed) or TOML table:
//!
//! - `modules-left` / `modules-center` / `modules-right`: module ids in
//!   render order
//! - one object per module id with its settings (`format`, `exec`, ...)
//! - an optional `engine` object tuning timeouts and restart policy
//!
//! Everything else at the top level (bar height, position, ...) belongs to
//! the render layer and is ignored here.

pub mod loader;
pub mod watcher;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::convert::TryFrom;
use std::time::Duration;

use crate::error::Error;
use crate::models::module_spec::{duration_from_secs, CUSTOM_PREFIX};
use crate::models::ModuleSpec;

/// Main configuration structure for modbar
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "modules-left", default)]
    pub modules_left: Vec<String>,

    #[serde(rename = "modules-center", default)]
    pub modules_center: Vec<String>,

    #[serde(rename = "modules-right", default)]
    pub modules_right: Vec<String>,

    /// Engine tuning
    #[serde(default)]
    pub engine: EngineSettings,

    /// Module objects keyed by id, plus any top-level keys we do not use
    #[serde(flatten)]
    pub modules: HashMap<String, Value>,
}

/// Where a module is placed on the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Left,
    Center,
    Right,
}

/// Module placement, independent of scheduling
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layout {
    pub left: Vec<String>,
    pub center: Vec<String>,
    pub right: Vec<String>,
}

impl Layout {
    /// Every placed module, left to right, first occurrence only
    pub fn modules(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.left
            .iter()
            .chain(&self.center)
            .chain(&self.right)
            .map(String::as_str)
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Section holding a module
    pub fn position_of(&self, module: &str) -> Option<Position> {
        let holds = |section: &[String]| section.iter().any(|id| id == module);
        if holds(&self.left) {
            Some(Position::Left)
        } else if holds(&self.center) {
            Some(Position::Center)
        } else if holds(&self.right) {
            Some(Position::Right)
        } else {
            None
        }
    }
}

impl Config {
    /// Render layout from the `modules-*` lists
    pub fn layout(&self) -> Layout {
        Layout {
            left: self.modules_left.clone(),
            center: self.modules_center.clone(),
            right: self.modules_right.clone(),
        }
    }

    /// Validated specs for every placed module
    ///
    /// Returns the specs that passed validation alongside the errors of
    /// those that did not; invalid modules are left out rather than
    /// stopping the engine.
    pub fn try_module_specs(&self) -> (Vec<ModuleSpec>, Vec<Error>) {
        let mut specs = Vec::new();
        let mut errors = Vec::new();

        for id in self.layout().modules() {
            let result = match self.modules.get(id) {
                Some(value) => ModuleSpec::from_value(id, value),
                None if id.starts_with(CUSTOM_PREFIX) => Err(Error::ConfigValidationFailed {
                    field: id.to_string(),
                    reason: "custom module has no configuration object".to_string(),
                }),
                None => Ok(ModuleSpec::new(id)),
            };
            match result {
                Ok(spec) => specs.push(spec),
                Err(e) => errors.push(e),
            }
        }

        (specs, errors)
    }

    /// Like [`Config::try_module_specs`], logging and dropping invalid modules
    pub fn module_specs(&self) -> Vec<ModuleSpec> {
        let (specs, errors) = self.try_module_specs();
        for e in errors {
            warn!("Skipping module: {}", e);
        }
        specs
    }
}

/// Engine timeouts and restart policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEngineSettings", into = "RawEngineSettings")]
pub struct EngineSettings {
    /// Deadline for a module poll or `exec-if` gate
    pub exec_timeout: Duration,
    /// Deadline for click/scroll commands
    pub action_timeout: Duration,
    /// Time between SIGTERM and SIGKILL on shutdown
    pub shutdown_grace: Duration,
    /// Consecutive stream failures tolerated before a module is errored
    pub max_restarts: u32,
    /// First restart delay of a continuous module
    pub restart_backoff: Duration,
    /// Restart delay cap
    pub restart_backoff_max: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            exec_timeout: Duration::from_secs(30),
            action_timeout: Duration::from_secs(120),
            shutdown_grace: Duration::from_secs(2),
            max_restarts: 5,
            restart_backoff: Duration::from_secs(1),
            restart_backoff_max: Duration::from_secs(60),
        }
    }
}

/// `engine` object as written in the config, durations in seconds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct RawEngineSettings {
    exec_timeout: Option<f64>,
    action_timeout: Option<f64>,
    shutdown_grace: Option<f64>,
    max_restarts: Option<u32>,
    restart_backoff: Option<f64>,
    restart_backoff_max: Option<f64>,
}

fn seconds(field: &str, value: Option<f64>, default: Duration) -> std::result::Result<Duration, String> {
    match value {
        None => Ok(default),
        Some(secs) => duration_from_secs(secs).ok_or_else(|| {
            format!(
                "engine.{} must be a number of seconds between 0.001 and u64::MAX, got {}",
                field, secs
            )
        }),
    }
}

impl TryFrom<RawEngineSettings> for EngineSettings {
    type Error = String;

    fn try_from(raw: RawEngineSettings) -> std::result::Result<Self, String> {
        let defaults = EngineSettings::default();
        let settings = EngineSettings {
            exec_timeout: seconds("exec-timeout", raw.exec_timeout, defaults.exec_timeout)?,
            action_timeout: seconds("action-timeout", raw.action_timeout, defaults.action_timeout)?,
            shutdown_grace: seconds("shutdown-grace", raw.shutdown_grace, defaults.shutdown_grace)?,
            max_restarts: raw.max_restarts.unwrap_or(defaults.max_restarts),
            restart_backoff: seconds("restart-backoff", raw.restart_backoff, defaults.restart_backoff)?,
            restart_backoff_max: seconds(
                "restart-backoff-max",
                raw.restart_backoff_max,
                defaults.restart_backoff_max,
            )?,
        };
        if settings.restart_backoff_max < settings.restart_backoff {
            return Err("engine.restart-backoff-max cannot be below engine.restart-backoff".to_string());
        }
        Ok(settings)
    }
}

impl From<EngineSettings> for RawEngineSettings {
    fn from(settings: EngineSettings) -> Self {
        Self {
            exec_timeout: Some(settings.exec_timeout.as_secs_f64()),
            action_timeout: Some(settings.action_timeout.as_secs_f64()),
            shutdown_grace: Some(settings.shutdown_grace.as_secs_f64()),
            max_restarts: Some(settings.max_restarts),
            restart_backoff: Some(settings.restart_backoff.as_secs_f64()),
            restart_backoff_max: Some(settings.restart_backoff_max.as_secs_f64()),
        }
    }
}
