//! Output interpretation
//!
//! Normalizes module output (plain text or the JSON line protocol) into
//! render snapshots and renders their labels.

pub mod format;
pub mod parser;

pub use format::{escape_markup, render_template, truncate, TemplateValues};
pub use parser::OutputParser;
