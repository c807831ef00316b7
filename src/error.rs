//! Error types and Result aliases for modbar

use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for modbar operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for modbar
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // === Process errors ===
    /// Failed to spawn a command
    #[error("Failed to spawn command '{command}': {reason}")]
    CommandSpawnFailed { command: String, reason: String },

    /// Command exited with a nonzero status (or was killed by a signal)
    #[error("Command '{command}' failed with exit code {code:?}")]
    CommandFailed { command: String, code: Option<i32> },

    /// Command did not finish before its deadline
    #[error("Command '{command}' timed out after {duration:?}")]
    CommandTimeout { command: String, duration: Duration },

    /// Empty command
    #[error("Command cannot be empty")]
    EmptyCommand,

    /// Failed to send signal to a process group
    #[error("Failed to send signal '{signal}': {reason}")]
    SignalSendFailed { signal: String, reason: String },

    /// Child process has no PID (already reaped)
    #[error("No PID available for command '{command}'")]
    NoPidAvailable { command: String },

    // === Configuration errors ===
    /// Failed to load configuration file
    #[error("Failed to load config from '{}': {reason}", path.display())]
    ConfigLoadFailed { path: PathBuf, reason: String },

    /// Configuration file not found
    #[error("Configuration file not found")]
    ConfigNotFound,

    /// Failed to parse configuration
    #[error("Failed to parse {format} config: {reason}")]
    ConfigParseFailed { format: String, reason: String },

    /// Configuration validation failed
    #[error("Configuration validation failed for '{field}': {reason}")]
    ConfigValidationFailed { field: String, reason: String },

    /// Failed to watch configuration file
    #[error("Failed to watch configuration: {reason}")]
    ConfigWatchFailed { reason: String },

    // === Engine errors ===
    /// No module with this identifier is loaded
    #[error("Module '{module}' not found")]
    ModuleNotFound { module: String },

    /// No data source registered for a built-in module
    #[error("No data source registered for module '{module}'")]
    SourceNotFound { module: String },

    /// The scheduler loop is no longer running
    #[error("Engine is not running")]
    EngineStopped,

    // === I/O and serialization errors ===
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    // === Generic fallback (use sparingly) ===
    /// Generic errors (for cases not yet categorized)
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    /// Whether the error is worth retrying on the next trigger
    ///
    /// Configuration errors are permanent for the session; everything
    /// produced by running a command is transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::CommandSpawnFailed { .. }
                | Error::CommandFailed { .. }
                | Error::CommandTimeout { .. }
                | Error::Io(_)
        )
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Error::Other(err)
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Error::Other(err.to_string())
    }
}
