//! Configuration File Watcher
//!
//! Watches the config file and yields a freshly parsed [`Config`] after it
//! changes, so the engine can be restarted with the new module set.

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

use super::loader::ConfigLoader;
use super::Config;
use crate::error::{Error, Result};

/// Quiet period after the last event before the file is read
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Configuration file watcher
pub struct ConfigWatcher {
    /// Path to the configuration file being watched
    config_path: PathBuf,
    /// File system watcher; dropping it stops the events
    _watcher: RecommendedWatcher,
    event_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl ConfigWatcher {
    /// Start watching `config_path`
    ///
    /// The parent directory is watched rather than the file, since editors
    /// often save by replacing the file.
    pub fn new(config_path: PathBuf) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res| {
            // Receiver gone means the watcher is being dropped
            let _ = event_tx.send(res);
        })
        .map_err(|e| Error::ConfigWatchFailed {
            reason: format!("Failed to create watcher: {}", e),
        })?;

        let watch_path = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        watcher
            .watch(watch_path, RecursiveMode::NonRecursive)
            .map_err(|e| Error::ConfigWatchFailed {
                reason: format!("Failed to watch directory: {}", e),
            })?;

        info!("Watching config file: {}", config_path.display());

        Ok(Self {
            config_path,
            _watcher: watcher,
            event_rx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Wait for the config file to change and reload it
    ///
    /// Returns `None` once the underlying watcher stops. A file that fails
    /// to parse yields `Some(Err(..))`; the caller keeps its current config.
    pub async fn changed(&mut self) -> Option<Result<Config>> {
        loop {
            match self.event_rx.recv().await? {
                Ok(event) if self.is_config_file_event(&event) => {
                    debug!("Config file change detected: {:?}", event.kind);
                    self.settle().await;
                    return Some(ConfigLoader::load_from_path(&self.config_path));
                }
                Ok(_) => {}
                Err(e) => error!("File watch error: {}", e),
            }
        }
    }

    /// Swallow the burst of events a single save produces
    async fn settle(&mut self) {
        loop {
            tokio::select! {
                event = self.event_rx.recv() => {
                    if event.is_none() {
                        return;
                    }
                }
                _ = sleep(SETTLE_DELAY) => return,
            }
        }
    }

    /// Check if a file system event is for our config file
    fn is_config_file_event(&self, event: &Event) -> bool {
        let target = self.config_path.file_name();
        event
            .paths
            .iter()
            .any(|p| p == &self.config_path || (target.is_some() && p.file_name() == target))
    }
}
