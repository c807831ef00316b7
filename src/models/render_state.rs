//! Render State
//!
//! Immutable snapshot of what a module currently displays. Every update
//! builds a new value; the store hands out `Arc<RenderState>` so readers
//! never observe a half-written state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::icons::StateKey;

/// Class applied when a poll fails
pub const ERROR_CLASS: &str = "error";

/// Normalized module output, before formatting
///
/// This is what both the JSON line protocol and built-in data sources
/// produce.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub text: String,
    pub tooltip: Option<String>,
    pub classes: Vec<String>,
    pub alt: Option<String>,
    pub percentage: Option<u8>,
}

impl Sample {
    /// A sample carrying only text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Snapshot of a module's display content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderState {
    /// Content text, after escaping and truncation
    pub text: String,
    /// Final label: the format template with placeholders filled in
    pub label: String,
    pub tooltip: Option<String>,
    /// Classes reported by the module, most specific first
    pub classes: Vec<String>,
    pub alt: Option<String>,
    pub percentage: Option<u8>,
    /// Whether the label was rendered with `format-alt`
    pub alt_format: bool,
    /// Value kept from an earlier update after its source failed
    pub stale: bool,
    /// Produced by a failed poll
    pub error: bool,
    pub updated_at: DateTime<Utc>,
}

impl RenderState {
    /// Blank state with the error class, used when a poll fails
    pub fn failed() -> Self {
        Self {
            text: String::new(),
            label: String::new(),
            tooltip: None,
            classes: vec![ERROR_CLASS.to_string()],
            alt: None,
            percentage: None,
            alt_format: false,
            stale: false,
            error: true,
            updated_at: Utc::now(),
        }
    }

    /// Primary state key: `alt` when present, else the first class
    pub fn state_key(&self) -> Option<StateKey> {
        self.alt
            .as_deref()
            .or_else(|| self.classes.first().map(String::as_str))
            .map(StateKey::from_class)
    }

    /// All keys usable for icon lookup, most specific first
    pub fn state_keys(&self) -> Vec<StateKey> {
        self.alt
            .iter()
            .chain(self.classes.iter())
            .map(|s| StateKey::from_class(s))
            .collect()
    }

    /// Whether the render layer should show the module at all
    pub fn is_visible(&self) -> bool {
        !self.label.is_empty()
    }

    /// Copy of this state flagged as stale
    pub fn mark_stale(&self) -> Self {
        Self {
            stale: true,
            ..self.clone()
        }
    }
}
