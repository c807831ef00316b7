//! Input Event Definitions
//!
//! Pointer events the render layer forwards to the engine, and the
//! per-module table binding them to commands.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A pointer event delivered to a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// Primary button
    ClickLeft,
    /// Secondary button
    ClickRight,
    /// Middle button
    ClickMiddle,
    /// Forward side button
    ClickForward,
    /// Backward side button
    ClickBackward,
    /// Wheel up
    ScrollUp,
    /// Wheel down
    ScrollDown,
}

impl EventKind {
    /// Every event kind, in config-key order
    pub const ALL: [EventKind; 7] = [
        EventKind::ClickLeft,
        EventKind::ClickRight,
        EventKind::ClickMiddle,
        EventKind::ClickForward,
        EventKind::ClickBackward,
        EventKind::ScrollUp,
        EventKind::ScrollDown,
    ];

    /// The module config key that binds this event
    pub fn config_key(&self) -> &'static str {
        match self {
            EventKind::ClickLeft => "on-click",
            EventKind::ClickRight => "on-click-right",
            EventKind::ClickMiddle => "on-click-middle",
            EventKind::ClickForward => "on-click-forward",
            EventKind::ClickBackward => "on-click-backward",
            EventKind::ScrollUp => "on-scroll-up",
            EventKind::ScrollDown => "on-scroll-down",
        }
    }

    /// Parse an event from its config key or short name
    pub fn from_string(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "on-click" | "click" | "click-left" | "left" => Some(EventKind::ClickLeft),
            "on-click-right" | "click-right" | "right" => Some(EventKind::ClickRight),
            "on-click-middle" | "click-middle" | "middle" => Some(EventKind::ClickMiddle),
            "on-click-forward" | "click-forward" | "forward" => Some(EventKind::ClickForward),
            "on-click-backward" | "click-backward" | "backward" => Some(EventKind::ClickBackward),
            "on-scroll-up" | "scroll-up" | "up" => Some(EventKind::ScrollUp),
            "on-scroll-down" | "scroll-down" | "down" => Some(EventKind::ScrollDown),
            _ => None,
        }
    }

    /// Whether this is a wheel event
    pub fn is_scroll(&self) -> bool {
        matches!(self, EventKind::ScrollUp | EventKind::ScrollDown)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

/// Commands bound to a module's pointer events
///
/// Only bound events appear in the table; lookups for anything else
/// return `None` and the event is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionBindings {
    bindings: HashMap<EventKind, String>,
}

impl ActionBindings {
    /// Create an empty binding table
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a command to an event, ignoring blank commands
    pub fn bind(&mut self, kind: EventKind, command: impl Into<String>) {
        let command = command.into();
        if command.trim().is_empty() {
            return;
        }
        self.bindings.insert(kind, command);
    }

    /// Builder-style [`ActionBindings::bind`]
    pub fn with(mut self, kind: EventKind, command: impl Into<String>) -> Self {
        self.bind(kind, command);
        self
    }

    /// Command bound to an event
    pub fn get(&self, kind: EventKind) -> Option<&str> {
        self.bindings.get(&kind).map(String::as_str)
    }

    /// Whether the event has a command
    pub fn is_bound(&self, kind: EventKind) -> bool {
        self.bindings.contains_key(&kind)
    }

    /// Number of bound events
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
