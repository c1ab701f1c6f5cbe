//! Configuration file watcher for live select-mode changes.
//!
//! Only `select_mode` can change without rebuilding the selector; other edits
//! are reported and ignored until restart.

use std::path::{Path, PathBuf};
use std::time::Duration;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::SelectorConfig;
use crate::selector::SelectMode;

/// Watches the configuration file and emits select-mode changes.
pub struct ConfigWatcher {
    path: PathBuf,
    current: SelectorConfig,
    update_tx: mpsc::UnboundedSender<SelectMode>,
}

impl ConfigWatcher {
    /// Create a watcher seeded with the configuration currently in effect.
    ///
    /// Returns the watcher and a receiver for mode updates.
    pub fn new(path: &Path, current: SelectorConfig) -> (Self, mpsc::UnboundedReceiver<SelectMode>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (Self {
            path: path.to_path_buf(),
            current,
            update_tx,
        }, update_rx)
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self { path, mut current, update_tx } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(move |res: notify::Result<Event>| {
            match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    match load_config(&path) {
                        Ok(next) => {
                            if let Some(mode) = mode_change(&current, &next) {
                                tracing::info!(mode = %mode, "Config change: select mode");
                                let _ = update_tx.send(mode);
                            }
                            if discovery_changed(&current, &next) {
                                tracing::warn!("Discovery settings changed; restart to apply");
                            }
                            current = next;
                        }
                        Err(e) => {
                            tracing::error!("Failed to reload config: {}. Keeping current configuration.", e);
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!("Watch error: {:?}", e),
            }
        }, Config::default().with_poll_interval(Duration::from_secs(2)))?;

        watcher.watch(&watched, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?watched, "Config watcher started");
        Ok(watcher)
    }
}

fn mode_change(current: &SelectorConfig, next: &SelectorConfig) -> Option<SelectMode> {
    (current.select_mode != next.select_mode).then_some(next.select_mode)
}

fn discovery_changed(current: &SelectorConfig, next: &SelectorConfig) -> bool {
    toml::to_string(&current.discovery).ok() != toml::to_string(&next.discovery).ok()
}
