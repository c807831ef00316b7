//! Module Specifications
//!
//! The typed, validated description of one panel module. A spec is built
//! once from the config object that names it and never changes afterwards;
//! a config reload builds a fresh set.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::event_kind::{ActionBindings, EventKind};
use super::icons::FormatIcons;
use crate::error::{Error, Result};

/// Identifier prefix for script-driven modules
pub const CUSTOM_PREFIX: &str = "custom/";

/// Highest accepted `signal` offset above `SIGRTMIN`
pub const MAX_SIGNAL_OFFSET: i32 = 30;

/// Shortest accepted period or timeout
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Convert a config value in seconds into a duration
///
/// `None` for NaN, infinities, negatives, values too large to represent,
/// and anything shorter than [`MIN_PERIOD`].
pub fn duration_from_secs(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|duration| *duration >= MIN_PERIOD)
}

/// How a module's output is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnType {
    /// Whole output is the label text
    #[default]
    Text,
    /// Each line or capture is a small JSON object
    Json,
}

/// Where a module's data comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleKind {
    /// `custom/<name>`: driven by `exec`
    Custom,
    /// Built-in module backed by a registered data source
    Builtin(String),
}

/// Refresh mechanism of a module instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Re-run every period
    Interval(Duration),
    /// Subscribe to a long-running process for the module's lifetime
    Continuous,
    /// Only refreshed by actions, signals or explicit requests
    EventOnly,
}

/// Parsed `interval` value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    Every(Duration),
    /// Run a single time at startup
    Once,
}

/// `interval` as written in the config: seconds or the keyword `"once"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntervalValue {
    Seconds(f64),
    Keyword(String),
}

/// Module object exactly as it appears in the config
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RawModuleSpec {
    pub format: Option<String>,
    pub format_alt: Option<String>,
    pub interval: Option<IntervalValue>,
    pub exec: Option<String>,
    pub exec_if: Option<String>,
    pub exec_on_event: Option<bool>,
    pub return_type: Option<String>,
    pub max_length: Option<i64>,
    pub escape: Option<bool>,
    pub format_icons: Option<Value>,
    pub tooltip: Option<bool>,
    pub on_click: Option<String>,
    pub on_click_right: Option<String>,
    pub on_click_middle: Option<String>,
    pub on_click_forward: Option<String>,
    pub on_click_backward: Option<String>,
    pub on_scroll_up: Option<String>,
    pub on_scroll_down: Option<String>,
    pub signal: Option<i32>,
    pub restart_interval: Option<f64>,
}

impl RawModuleSpec {
    /// Deserialize from a config value
    pub fn from_value(id: &str, value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(|e| Error::ConfigValidationFailed {
            field: id.to_string(),
            reason: e.to_string(),
        })
    }

    fn action(&self, kind: EventKind) -> Option<&String> {
        match kind {
            EventKind::ClickLeft => self.on_click.as_ref(),
            EventKind::ClickRight => self.on_click_right.as_ref(),
            EventKind::ClickMiddle => self.on_click_middle.as_ref(),
            EventKind::ClickForward => self.on_click_forward.as_ref(),
            EventKind::ClickBackward => self.on_click_backward.as_ref(),
            EventKind::ScrollUp => self.on_scroll_up.as_ref(),
            EventKind::ScrollDown => self.on_scroll_down.as_ref(),
        }
    }
}

/// Validated module specification
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleSpec {
    /// Identifier as referenced by the layout (e.g. `custom/media`)
    pub id: String,
    pub kind: ModuleKind,
    /// Label template
    pub format: String,
    /// Alternate template toggled by a left click
    pub format_alt: Option<String>,
    pub interval: Option<Interval>,
    pub exec: Option<String>,
    /// Gating command; nonzero exit disables the module for the session
    pub exec_if: Option<String>,
    /// Re-run the module after one of its actions fires
    pub exec_on_event: bool,
    pub return_type: ReturnType,
    pub max_length: Option<usize>,
    pub escape: bool,
    pub format_icons: Option<FormatIcons>,
    /// Whether tooltips are shown
    pub tooltip: bool,
    pub actions: ActionBindings,
    /// Offset above `SIGRTMIN` that refreshes this module
    pub signal: Option<i32>,
    /// Base delay before restarting an exited continuous process
    pub restart_interval: Option<Duration>,
}

impl ModuleSpec {
    /// Create a spec with defaults for the given identifier
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            kind: kind_for_id(&id),
            id,
            format: "{}".to_string(),
            format_alt: None,
            interval: None,
            exec: None,
            exec_if: None,
            exec_on_event: true,
            return_type: ReturnType::Text,
            max_length: None,
            escape: false,
            format_icons: None,
            tooltip: true,
            actions: ActionBindings::new(),
            signal: None,
            restart_interval: None,
        }
    }

    /// Validate a raw config object into a spec
    pub fn from_raw(id: &str, raw: RawModuleSpec) -> Result<Self> {
        let invalid = |field: &str, reason: &str| Error::ConfigValidationFailed {
            field: format!("{}.{}", id, field),
            reason: reason.to_string(),
        };

        let mut spec = ModuleSpec::new(id);

        if let Some(format) = raw.format.clone() {
            spec.format = format;
        }
        spec.format_alt = raw.format_alt.clone();

        spec.interval = match &raw.interval {
            None => None,
            Some(IntervalValue::Seconds(secs)) => match duration_from_secs(*secs) {
                Some(period) => Some(Interval::Every(period)),
                None => {
                    return Err(invalid(
                        "interval",
                        "must be a number of seconds between 0.001 and u64::MAX",
                    ))
                }
            },
            Some(IntervalValue::Keyword(word)) if word == "once" => Some(Interval::Once),
            Some(IntervalValue::Keyword(word)) => {
                return Err(invalid(
                    "interval",
                    &format!("unknown keyword '{}', expected seconds or \"once\"", word),
                ))
            }
        };

        for (field, command) in [("exec", &raw.exec), ("exec-if", &raw.exec_if)] {
            if matches!(command, Some(c) if c.trim().is_empty()) {
                return Err(invalid(field, "command cannot be empty"));
            }
        }
        spec.exec = raw.exec.clone();
        spec.exec_if = raw.exec_if.clone();
        spec.exec_on_event = raw.exec_on_event.unwrap_or(true);

        spec.return_type = match raw.return_type.as_deref() {
            None | Some("") | Some("text") => ReturnType::Text,
            Some("json") => ReturnType::Json,
            Some(other) => {
                return Err(invalid(
                    "return-type",
                    &format!("unknown return type '{}'", other),
                ))
            }
        };

        spec.max_length = match raw.max_length {
            None => None,
            Some(len) if len < 0 => return Err(invalid("max-length", "cannot be negative")),
            Some(len) => Some(len as usize),
        };

        spec.escape = raw.escape.unwrap_or(false);
        spec.tooltip = raw.tooltip.unwrap_or(true);

        if let Some(value) = &raw.format_icons {
            let icons = FormatIcons::from_value(value).ok_or_else(|| {
                invalid(
                    "format-icons",
                    "expected an object of strings or a non-empty array of strings",
                )
            })?;
            spec.format_icons = Some(icons);
        }

        for kind in EventKind::ALL {
            if let Some(command) = raw.action(kind) {
                spec.actions.bind(kind, command.clone());
            }
        }

        if let Some(signal) = raw.signal {
            if !(1..=MAX_SIGNAL_OFFSET).contains(&signal) {
                return Err(invalid(
                    "signal",
                    &format!("must be between 1 and {}", MAX_SIGNAL_OFFSET),
                ));
            }
            spec.signal = Some(signal);
        }

        if let Some(secs) = raw.restart_interval {
            let delay = duration_from_secs(secs).ok_or_else(|| {
                invalid(
                    "restart-interval",
                    "must be a number of seconds between 0.001 and u64::MAX",
                )
            })?;
            spec.restart_interval = Some(delay);
        }

        Ok(spec)
    }

    /// Convenience for [`RawModuleSpec::from_value`] followed by [`ModuleSpec::from_raw`]
    pub fn from_value(id: &str, value: &Value) -> Result<Self> {
        Self::from_raw(id, RawModuleSpec::from_value(id, value)?)
    }

    /// Trigger for a script-driven module
    ///
    /// Built-in modules are always interval driven; see
    /// [`ModuleSpec::builtin_trigger`].
    pub fn trigger(&self) -> Trigger {
        match (&self.interval, &self.exec) {
            (Some(Interval::Every(period)), Some(_)) => Trigger::Interval(*period),
            (Some(Interval::Once), _) => Trigger::EventOnly,
            (None, Some(_)) => Trigger::Continuous,
            (_, None) => Trigger::EventOnly,
        }
    }

    /// Trigger for a built-in module whose source suggests `default_period`
    pub fn builtin_trigger(&self, default_period: Duration) -> Trigger {
        match self.interval {
            Some(Interval::Every(period)) => Trigger::Interval(period),
            Some(Interval::Once) => Trigger::EventOnly,
            None => Trigger::Interval(default_period),
        }
    }

    /// Whether an event-only module still polls once when enabled
    pub fn polls_at_start(&self) -> bool {
        matches!(self.interval, Some(Interval::Once))
    }

    /// Whether a left click should toggle the alternate format
    pub fn toggles_alt_on_click(&self) -> bool {
        self.format_alt.is_some() && !self.actions.is_bound(EventKind::ClickLeft)
    }

    /// Name of the built-in source, if any
    pub fn builtin_name(&self) -> Option<&str> {
        match &self.kind {
            ModuleKind::Builtin(name) => Some(name),
            ModuleKind::Custom => None,
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_exec(mut self, command: impl Into<String>) -> Self {
        self.exec = Some(command.into());
        self
    }

    pub fn with_exec_if(mut self, command: impl Into<String>) -> Self {
        self.exec_if = Some(command.into());
        self
    }

    pub fn with_interval(mut self, period: Duration) -> Self {
        self.interval = Some(Interval::Every(period));
        self
    }

    pub fn with_return_type(mut self, return_type: ReturnType) -> Self {
        self.return_type = return_type;
        self
    }

    pub fn with_action(mut self, kind: EventKind, command: impl Into<String>) -> Self {
        self.actions.bind(kind, command);
        self
    }
}

/// Derive the module kind from its identifier
///
/// `custom/foo` is script driven; anything else names a built-in, with an
/// optional `#instance` suffix stripped (`clock#utc` → `clock`).
fn kind_for_id(id: &str) -> ModuleKind {
    if id.starts_with(CUSTOM_PREFIX) {
        return ModuleKind::Custom;
    }
    let base = id.split('#').next().unwrap_or(id);
    ModuleKind::Builtin(base.to_string())
}
