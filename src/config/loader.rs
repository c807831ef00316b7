//! Configuration File Loading
//!
//! Finds the config file in the usual locations and parses it as JSON
//! (with `//` and `/* */` comments) or TOML depending on its extension.

use super::Config;
use crate::error::{Error, Result};
use serde_json::Value;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// File names tried in every search directory, in order
const CONFIG_FILE_NAMES: [&str; 4] = ["config", "config.jsonc", "config.json", "config.toml"];

/// Configuration file loader
pub struct ConfigLoader {
    /// Directories searched for a config file
    search_paths: Vec<PathBuf>,
    /// Path of the file that was loaded, if any
    current_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigFormat {
    /// JSON, comments allowed
    Json,
    Toml,
}

impl ConfigFormat {
    /// Format implied by a file's extension; anything unknown is JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            search_paths: Self::get_search_paths(),
            current_path: None,
        }
    }

    /// Load the first config file found in the search paths
    pub fn load() -> Result<(PathBuf, Config)> {
        let mut loader = Self::new();
        let path = loader.find_config_path().ok_or(Error::ConfigNotFound)?;
        let config = Self::load_from_path(&path)?;
        loader.current_path = Some(path.clone());
        Ok((path, config))
    }

    /// Load a specific configuration file
    pub fn load_from_path(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| Error::ConfigLoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config = Self::parse(&content, ConfigFormat::from_path(path))?;
        validate_config(&config)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse config text in the given format
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Config> {
        match format {
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| Error::ConfigParseFailed {
                format: "TOML".to_string(),
                reason: e.to_string(),
            }),
            ConfigFormat::Json => {
                let stripped = strip_json_comments(content);
                let value: Value =
                    serde_json::from_str(&stripped).map_err(|e| Error::ConfigParseFailed {
                        format: "JSON".to_string(),
                        reason: e.to_string(),
                    })?;
                // A list of bar configs: this engine drives the first one
                let value = match value {
                    Value::Array(mut bars) if !bars.is_empty() => {
                        if bars.len() > 1 {
                            warn!("Config lists {} bars, using the first", bars.len());
                        }
                        bars.swap_remove(0)
                    }
                    other => other,
                };
                serde_json::from_value(value).map_err(|e| Error::ConfigParseFailed {
                    format: "JSON".to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// First existing config file in the search paths
    pub fn find_config_path(&self) -> Option<PathBuf> {
        self.search_paths
            .iter()
            .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
            .find(|path| path.is_file())
    }

    /// Get default search paths for configuration files
    fn get_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(xdg_config) = env::var("XDG_CONFIG_HOME") {
            if !xdg_config.is_empty() {
                paths.push(PathBuf::from(xdg_config).join("modbar"));
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("modbar"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join("modbar"));
        }

        paths.push(PathBuf::from("/etc/xdg/modbar"));
        paths.dedup();
        paths
    }

    /// Get the current configuration file path
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    /// List all search paths
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Add a custom search path
    pub fn add_search_path(&mut self, path: PathBuf) {
        self.search_paths.push(path);
    }

    /// Clear all search paths and add a single path
    pub fn set_search_path(&mut self, path: PathBuf) {
        self.search_paths = vec![path];
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks that apply to the whole file
///
/// Per-module problems are not fatal here; they are reported when the
/// engine builds its module specs.
pub fn validate_config(config: &Config) -> Result<()> {
    let layout = config.layout();
    for (section, ids) in [
        ("modules-left", &layout.left),
        ("modules-center", &layout.center),
        ("modules-right", &layout.right),
    ] {
        if ids.iter().any(|id| id.trim().is_empty()) {
            return Err(Error::ConfigValidationFailed {
                field: section.to_string(),
                reason: "module ids cannot be empty".to_string(),
            });
        }
    }

    if layout.modules().is_empty() {
        warn!("Config places no modules");
    }

    Ok(())
}

/// Remove `//` and `/* */` comments outside of string literals
pub fn strip_json_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    if next == '\n' {
                        out.push('\n');
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }

    out
}
