//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use crate::config::loader::load_config;
use crate::config::schema::ConfigurationSnapshot;
use crate::config::store::ConfigurationStore;
use crate::level::LevelTable;

/// A watcher that monitors a logging configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    levels: LevelTable,
    update_tx: mpsc::UnboundedSender<ConfigurationSnapshot>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for validated snapshots.
    pub fn new(path: &Path, levels: LevelTable) -> (Self, mpsc::UnboundedReceiver<ConfigurationSnapshot>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                levels,
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file. The returned watcher must be kept alive.
    ///
    /// Files that fail to load or validate are logged and skipped; the current
    /// configuration stays in effect.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();
        let levels = self.levels.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!(path = ?path, "Logging config change detected, reloading...");
                        match load_config(&path, &levels) {
                            Ok(snapshot) => {
                                let _ = tx.send(snapshot);
                            }
                            Err(e) => {
                                tracing::error!("Failed to reload logging config: {}. Keeping current configuration.", e);
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Apply snapshots from `updates` until shutdown or until the sender is gone.
/// Returns the number of snapshots applied.
pub async fn apply_updates(
    store: Arc<ConfigurationStore>,
    mut updates: mpsc::UnboundedReceiver<ConfigurationSnapshot>,
    mut shutdown: broadcast::Receiver<()>,
) -> usize {
    let mut applied = 0;
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(snapshot) = update else {
                    tracing::debug!("Config update channel closed");
                    break;
                };
                if let Err(e) = store.apply(snapshot) {
                    tracing::warn!(error = %e, "Configuration listeners failed after reload");
                }
                applied += 1;
            }
            _ = shutdown.recv() => {
                tracing::info!("Config updater received shutdown signal, exiting loop");
                break;
            }
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;
    use crate::lifecycle::Shutdown;
    use crate::registry::{Registry, RegistrySettings};

    fn store() -> Arc<ConfigurationStore> {
        let settings = RegistrySettings {
            initial: ConfigurationSnapshot::new(),
            ..RegistrySettings::default()
        };
        Arc::new(ConfigurationStore::new(Arc::new(Registry::new(settings))))
    }

    #[tokio::test]
    async fn test_apply_updates_until_channel_closes() {
        let store = store();
        let shutdown = Shutdown::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let a = store.registry().get_logger("a").unwrap();

        tx.send(ConfigurationSnapshot::new().with_level("a", Level::FINE)).unwrap();
        tx.send(ConfigurationSnapshot::new().with_level("a", Level::SEVERE)).unwrap();
        drop(tx);

        let applied = apply_updates(store.clone(), rx, shutdown.subscribe()).await;
        assert_eq!(applied, 2);
        assert_eq!(a.level(), Some(Level::SEVERE));
    }

    #[tokio::test]
    async fn test_apply_updates_stops_on_shutdown() {
        let store = store();
        let shutdown = Shutdown::new();
        let (_tx, rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(apply_updates(store, rx, shutdown.subscribe()));
        shutdown.trigger();
        assert_eq!(task.await.unwrap(), 0);
    }
}
