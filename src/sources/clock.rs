//! Clock data source
//!
//! Renders local time with the strftime pattern found in the module's
//! `format` (`{:%H:%M}`), or `%H:%M` when the format has none.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write;
use std::time::Duration;

use super::DataSource;
use crate::error::{Error, Result};
use crate::models::{ModuleSpec, Sample};

/// Pattern used when the format carries none
pub const DEFAULT_TIME_FORMAT: &str = "%H:%M";

static TIME_SPEC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{:([^{}]+)\}").expect("time spec regex is valid"));

/// Local time, refreshed once a minute by default
#[derive(Debug, Clone, Default)]
pub struct ClockSource;

impl ClockSource {
    pub fn new() -> Self {
        Self
    }

    /// strftime pattern embedded in a format template
    pub fn time_format(template: &str) -> &str {
        TIME_SPEC
            .captures(template)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .unwrap_or(DEFAULT_TIME_FORMAT)
    }

    /// Render `now` with `pattern`, rejecting invalid specifiers
    pub fn render(now: &DateTime<Local>, pattern: &str) -> Result<String> {
        let mut out = String::new();
        write!(out, "{}", now.format(pattern)).map_err(|_| Error::ConfigValidationFailed {
            field: "clock.format".to_string(),
            reason: format!("invalid time format '{}'", pattern),
        })?;
        Ok(out)
    }
}

#[async_trait]
impl DataSource for ClockSource {
    fn default_interval(&self) -> Duration {
        Duration::from_secs(60)
    }

    async fn sample(&self, spec: &ModuleSpec) -> Result<Sample> {
        let now = Local::now();
        let text = Self::render(&now, Self::time_format(&spec.format))?;
        let tooltip = Self::render(&now, "%A, %d %B %Y")?;
        Ok(Sample {
            text,
            tooltip: Some(tooltip),
            ..Default::default()
        })
    }
}
