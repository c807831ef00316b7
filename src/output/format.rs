//! Label formatting helpers
//!
//! Template placeholder substitution, markup escaping and length limits.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Marker appended to truncated text
pub const ELLIPSIS: char = '…';

/// `{}`, `{name}` and `{:spec}` / `{name:spec}` placeholders
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(\w*)(?::[^{}]*)?\}").expect("placeholder regex is valid"));

/// Values available to a label template
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateValues<'a> {
    pub text: &'a str,
    pub icon: &'a str,
    pub alt: Option<&'a str>,
    pub percentage: Option<u8>,
}

/// Fill a template's placeholders
///
/// `{}`, `{text}` and `{:…}` expand to the text; `{icon}`, `{alt}` and
/// `{percentage}` to their values (empty when absent). Unknown names are
/// left untouched.
pub fn render_template(template: &str, values: &TemplateValues<'_>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| match &caps[1] {
            "" | "text" => values.text.to_string(),
            "icon" => values.icon.to_string(),
            "alt" => values.alt.unwrap_or_default().to_string(),
            "percentage" => values
                .percentage
                .map(|p| p.to_string())
                .unwrap_or_default(),
            _ => caps[0].to_string(),
        })
        .into_owned()
}

/// Escape markup-reserved characters
pub fn escape_markup(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Limit text to `max_chars` characters, ending with [`ELLIPSIS`] when cut
pub fn truncate(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut out: String = input.chars().take(max_chars - 1).collect();
    out.push(ELLIPSIS);
    out
}

/// Strip exactly one trailing line terminator
pub fn trim_trailing_newline(input: &str) -> &str {
    input
        .strip_suffix("\r\n")
        .or_else(|| input.strip_suffix('\n'))
        .unwrap_or(input)
}
