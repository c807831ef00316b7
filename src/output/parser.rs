//! Output Parser
//!
//! Turns one captured output (interval poll) or one streamed line
//! (continuous module) into a [`RenderState`] according to the module's
//! `return-type`, `escape`, `max-length`, `format` and `format-icons`.

use chrono::Utc;
use serde::Deserialize;

use super::format::{
    escape_markup, render_template, trim_trailing_newline, truncate, TemplateValues,
};
use crate::error::Error;
use crate::models::{ModuleSpec, RenderState, ReturnType, Sample};

/// `class` may be a single string or a list
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassField {
    One(String),
    Many(Vec<String>),
}

/// One unit of the JSON line protocol; unknown keys are ignored
#[derive(Debug, Deserialize)]
struct JsonPayload {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    tooltip: Option<String>,
    #[serde(default)]
    class: Option<ClassField>,
    #[serde(default)]
    alt: Option<String>,
    #[serde(default)]
    percentage: Option<f64>,
}

impl From<JsonPayload> for Sample {
    fn from(payload: JsonPayload) -> Self {
        let classes = match payload.class {
            None => Vec::new(),
            Some(ClassField::One(class)) if class.is_empty() => Vec::new(),
            Some(ClassField::One(class)) => vec![class],
            Some(ClassField::Many(classes)) => classes,
        };
        Sample {
            text: payload.text.unwrap_or_default(),
            tooltip: payload.tooltip,
            classes,
            alt: payload.alt.filter(|alt| !alt.is_empty()),
            percentage: payload.percentage.map(|p| p.clamp(0.0, 100.0).round() as u8),
        }
    }
}

/// Parser bound to one module's spec
#[derive(Debug, Clone, Copy)]
pub struct OutputParser<'a> {
    spec: &'a ModuleSpec,
}

impl<'a> OutputParser<'a> {
    pub fn new(spec: &'a ModuleSpec) -> Self {
        Self { spec }
    }

    /// Interpret raw output as a [`Sample`]
    ///
    /// In JSON mode, output that is not a protocol object degrades to
    /// text mode instead of failing the module.
    pub fn parse_sample(&self, raw: &str) -> Sample {
        let raw = trim_trailing_newline(raw);
        match self.spec.return_type {
            ReturnType::Text => Sample::text(raw),
            ReturnType::Json => match serde_json::from_str::<JsonPayload>(raw.trim()) {
                Ok(payload) => payload.into(),
                Err(e) => {
                    debug!(
                        "{}: output is not a JSON state object ({}), using it as text",
                        self.spec.id, e
                    );
                    Sample::text(raw)
                }
            },
        }
    }

    /// Parse and render in one step
    pub fn parse(&self, raw: &str, alt_format: bool) -> RenderState {
        self.render(self.parse_sample(raw), alt_format)
    }

    /// Apply truncation, escaping, icons and the label template
    ///
    /// `max-length` counts characters of the raw text, so escaping never
    /// splits an entity. Empty text yields an empty label so the module
    /// is hidden.
    pub fn render(&self, sample: Sample, alt_format: bool) -> RenderState {
        let spec = self.spec;

        let mut text = match spec.max_length {
            Some(max) => truncate(&sample.text, max),
            None => sample.text,
        };
        if spec.escape {
            text = escape_markup(&text);
        }

        let tooltip = if spec.tooltip {
            sample.tooltip.map(|tip| {
                if spec.escape {
                    escape_markup(&tip)
                } else {
                    tip
                }
            })
        } else {
            None
        };

        let mut state = RenderState {
            text,
            label: String::new(),
            tooltip,
            classes: sample.classes,
            alt: sample.alt,
            percentage: sample.percentage,
            alt_format: alt_format && spec.format_alt.is_some(),
            stale: false,
            error: false,
            updated_at: Utc::now(),
        };

        if !state.text.is_empty() {
            state.label = self.label_for(&state);
        }
        state
    }

    /// Label of a module with no data source: the format itself
    pub fn render_static(&self, alt_format: bool) -> RenderState {
        let mut state = self.render(Sample::default(), alt_format);
        state.label = self.label_for(&state);
        state
    }

    /// Re-render an existing state with the other template
    pub fn relabel(&self, state: &RenderState, alt_format: bool) -> RenderState {
        let mut next = RenderState {
            alt_format: alt_format && self.spec.format_alt.is_some(),
            updated_at: Utc::now(),
            ..state.clone()
        };
        if !next.label.is_empty() {
            next.label = self.label_for(&next);
        }
        next
    }

    /// State for a failed poll
    pub fn failure(&self, err: &Error) -> RenderState {
        debug!("{}: rendering failure state: {}", self.spec.id, err);
        RenderState::failed()
    }

    fn label_for(&self, state: &RenderState) -> String {
        let template = match (&self.spec.format_alt, state.alt_format) {
            (Some(alt), true) => alt.as_str(),
            _ => self.spec.format.as_str(),
        };
        let keys = state.state_keys();
        let icon = self
            .spec
            .format_icons
            .as_ref()
            .map(|icons| icons.select(&keys, state.percentage))
            .unwrap_or_default();

        render_template(
            template,
            &TemplateValues {
                text: &state.text,
                icon,
                alt: state.alt.as_deref(),
                percentage: state.percentage,
            },
        )
    }
}
