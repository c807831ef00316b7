//! Icon selection by module state
//!
//! `format-icons` is either an object keyed by state (with a `default`
//! fallback) or an array ramp indexed by percentage.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// State key used to pick an icon
///
/// Well-known keys are enumerated; anything a script reports through
/// `class` or `alt` that is not listed here becomes `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StateKey {
    Default,
    Warning,
    Critical,
    Good,
    Playing,
    Paused,
    Stopped,
    Custom(String),
}

impl StateKey {
    pub fn as_str(&self) -> &str {
        match self {
            StateKey::Default => "default",
            StateKey::Warning => "warning",
            StateKey::Critical => "critical",
            StateKey::Good => "good",
            StateKey::Playing => "playing",
            StateKey::Paused => "paused",
            StateKey::Stopped => "stopped",
            StateKey::Custom(key) => key,
        }
    }

    /// Map a reported class or alt string onto a key
    pub fn from_class(s: &str) -> Self {
        match s {
            "default" => StateKey::Default,
            "warning" => StateKey::Warning,
            "critical" => StateKey::Critical,
            "good" => StateKey::Good,
            "playing" => StateKey::Playing,
            "paused" => StateKey::Paused,
            "stopped" => StateKey::Stopped,
            other => StateKey::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Icon table for a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatIcons {
    /// Icons keyed by state, with a required fallback
    Keyed {
        fallback: String,
        icons: HashMap<StateKey, String>,
    },
    /// Icons ordered from low to high percentage
    Ramp(Vec<String>),
}

impl FormatIcons {
    /// Build the table from its JSON form
    ///
    /// Returns `None` for shapes that are neither an object nor an array of
    /// strings. An object without `default` gets an empty fallback.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(map) => {
                let mut fallback = String::new();
                let mut icons = HashMap::new();
                for (key, icon) in map {
                    let icon = icon.as_str()?.to_string();
                    match StateKey::from_class(key) {
                        StateKey::Default => fallback = icon,
                        state => {
                            icons.insert(state, icon);
                        }
                    }
                }
                Some(FormatIcons::Keyed { fallback, icons })
            }
            Value::Array(items) => {
                let ramp = items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()?;
                if ramp.is_empty() {
                    return None;
                }
                Some(FormatIcons::Ramp(ramp))
            }
            Value::String(single) => Some(FormatIcons::Keyed {
                fallback: single.clone(),
                icons: HashMap::new(),
            }),
            _ => None,
        }
    }

    /// Pick an icon for the given state keys (most specific first) and percentage
    pub fn select<'a>(&'a self, keys: &[StateKey], percentage: Option<u8>) -> &'a str {
        match self {
            FormatIcons::Keyed { fallback, icons } => keys
                .iter()
                .find_map(|key| icons.get(key))
                .map(String::as_str)
                .unwrap_or(fallback),
            FormatIcons::Ramp(ramp) => {
                let last = ramp.len() - 1;
                let index = match percentage {
                    Some(pct) => (usize::from(pct) * ramp.len() / 100).min(last),
                    None => 0,
                };
                &ramp[index]
            }
        }
    }
}
