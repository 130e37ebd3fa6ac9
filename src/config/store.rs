//! Configuration store: applies snapshots to a live registry.
//!
//! # Data Flow
//! ```text
//! apply(snapshot, policy)
//!     → [config lock] merge with current, stamp next generation, swap
//!     → configure every live logger (each at most once per generation)
//!     → create configured ancestors of live loggers
//!     → [unlocked] sweep, then fire listeners
//! ```
//!
//! Only one apply or reset runs at a time. Loggers created concurrently pick
//! up whichever snapshot they load after publishing their name; the
//! per-logger generation check keeps the outcome identical either way.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::listeners::{ConfigurationListener, ConfigurationListenerSet};
use crate::config::schema::{ConfigurationSnapshot, MergePolicy};
use crate::error::{ListenerError, RegistryResult};
use crate::observability::metrics;
use crate::registry::{CloseSet, Registry};

pub struct ConfigurationStore {
    registry: Arc<Registry>,
    lock: Mutex<()>,
    listeners: ConfigurationListenerSet,
}

impl ConfigurationStore {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            lock: Mutex::new(()),
            listeners: ConfigurationListenerSet::new(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Snapshot currently in effect.
    pub fn current(&self) -> Arc<ConfigurationSnapshot> {
        self.registry.snapshot()
    }

    /// Replace the configuration with `snapshot`.
    pub fn apply(&self, snapshot: ConfigurationSnapshot) -> Result<(), ListenerError> {
        self.apply_with(snapshot, &MergePolicy::Replace)
    }

    /// Merge `snapshot` into the current configuration and reconfigure every
    /// live logger. Applying content equal to the current configuration
    /// changes nothing but the generation.
    ///
    /// Listener failures are returned after the configuration is in place.
    pub fn apply_with(&self, snapshot: ConfigurationSnapshot, policy: &MergePolicy) -> Result<(), ListenerError> {
        let generation;
        let closed;
        {
            let _guard = self.lock.lock();
            let previous = self.registry.snapshot();
            generation = previous.generation() + 1;
            let merged = Arc::new(ConfigurationSnapshot::merge(&previous, &snapshot, policy).stamped(generation));
            self.registry.install_snapshot(Arc::clone(&merged));

            let loggers = self.registry.live_loggers();
            let mut closer = CloseSet::default();
            for logger in &loggers {
                self.registry.configure(logger, &merged, false, &mut closer);
            }
            self.registry.adopt_configured_ancestors(&loggers, &merged);
            closed = closer.len();
            drop(loggers);
        }

        self.registry.sweep();
        metrics::record_configuration_applied();
        tracing::info!(generation, closed_handlers = closed, "Configuration applied");

        self.listeners.fire_all()
    }

    /// Close every handler on every live logger, clear all levels (the root
    /// returns to the default level) and empty the configuration.
    /// Listeners are not invoked.
    pub fn reset(&self) {
        let pins;
        let closed;
        {
            let _guard = self.lock.lock();
            let previous = self.registry.snapshot();
            let empty = Arc::new(ConfigurationSnapshot::new().stamped(previous.generation() + 1));
            self.registry.install_snapshot(Arc::clone(&empty));

            let loggers = self.registry.live_loggers();
            let mut closer = CloseSet::default();
            for logger in &loggers {
                self.registry.reset_logger(logger, &empty, &mut closer);
            }
            closed = closer.len();
            pins = self.registry.take_pins();
            drop(loggers);
        }
        drop(pins);

        self.registry.sweep();
        tracing::info!(closed_handlers = closed, "Configuration reset");
    }

    pub fn add_configuration_listener(&self, listener: Option<Arc<dyn ConfigurationListener>>) -> RegistryResult<()> {
        self.listeners.add(listener)
    }

    pub fn remove_configuration_listener(
        &self,
        listener: Option<&Arc<dyn ConfigurationListener>>,
    ) -> RegistryResult<()> {
        self.listeners.remove(listener)
    }

    pub fn listeners(&self) -> &ConfigurationListenerSet {
        &self.listeners
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::HandlerSpec;
    use crate::level::Level;
    use crate::logger::Logger;
    use crate::registry::RegistrySettings;

    fn store() -> ConfigurationStore {
        let settings = RegistrySettings {
            initial: ConfigurationSnapshot::new(),
            ..RegistrySettings::default()
        };
        ConfigurationStore::new(Arc::new(Registry::new(settings)))
    }

    fn with_buffer(logger: &str) -> ConfigurationSnapshot {
        ConfigurationSnapshot::new()
            .with_handlers(logger, ["buf"])
            .with_handler("buf", HandlerSpec::new("memory"))
    }

    #[test]
    fn test_apply_sets_levels_and_bumps_generation() {
        let store = store();
        let a = store.registry().get_logger("a").unwrap();
        let before = store.current().generation();

        store.apply(ConfigurationSnapshot::new().with_level("a", Level::FINE)).unwrap();
        assert_eq!(a.level(), Some(Level::FINE));
        assert_eq!(store.current().generation(), before + 1);
    }

    #[test]
    fn test_removed_level_is_left_in_place() {
        let store = store();
        let a = store.registry().get_logger("a").unwrap();
        store.apply(ConfigurationSnapshot::new().with_level("a", Level::FINE)).unwrap();
        store.apply(ConfigurationSnapshot::new()).unwrap();
        assert_eq!(a.level(), Some(Level::FINE));
    }

    #[test]
    fn test_identical_apply_keeps_handlers() {
        let store = store();
        let a = store.registry().get_logger("a").unwrap();
        store.apply(with_buffer("a")).unwrap();
        let first = a.handlers();
        assert_eq!(first.len(), 1);

        store.apply(with_buffer("a")).unwrap();
        let second = a.handlers();
        assert_eq!(second.len(), 1);
        assert!(crate::logger::same_handler(&first[0], &second[0]));
    }

    #[test]
    fn test_changed_handlers_are_replaced() {
        let store = store();
        let a = store.registry().get_logger("a").unwrap();
        store.apply(with_buffer("a")).unwrap();
        let old = a.handlers();

        store
            .apply(with_buffer("a").with_handler("buf", HandlerSpec::new("memory").with_option("capacity", "5")))
            .unwrap();
        let new = a.handlers();
        assert_eq!(new.len(), 1);
        assert!(!crate::logger::same_handler(&old[0], &new[0]));
    }

    #[test]
    fn test_use_parent_handlers_toggle() {
        let store = store();
        let a = store.registry().get_logger("a").unwrap();
        store
            .apply(ConfigurationSnapshot::new().with_use_parent_handlers("a", false))
            .unwrap();
        assert!(!a.use_parent_handlers());
        store.apply(ConfigurationSnapshot::new()).unwrap();
        assert!(a.use_parent_handlers());
    }

    #[test]
    fn test_merge_policy_prefer_old() {
        let store = store();
        let a = store.registry().get_logger("a").unwrap();
        store.apply(ConfigurationSnapshot::new().with_level("a", Level::FINE)).unwrap();
        store
            .apply_with(
                ConfigurationSnapshot::new()
                    .with_level("a", Level::SEVERE)
                    .with_level("b", Level::WARNING),
                &MergePolicy::PreferOld,
            )
            .unwrap();
        assert_eq!(a.level(), Some(Level::FINE));
        assert_eq!(store.registry().get_logger("b").unwrap().level(), Some(Level::WARNING));
    }

    #[test]
    fn test_reset_clears_levels_and_handlers() {
        let store = store();
        let a = store.registry().get_logger("a").unwrap();
        let root = store.registry().root();
        store
            .apply(with_buffer("a").with_level("a", Level::FINEST).with_level("", Level::SEVERE))
            .unwrap();
        assert_eq!(root.level(), Some(Level::SEVERE));

        store.reset();
        assert_eq!(a.level(), None);
        assert!(a.handlers().is_empty());
        assert_eq!(root.level(), Some(Level::INFO));
        assert_eq!(store.current().directives().count(), 0);
        assert_eq!(store.registry().pinned_count(), 0);
    }

    #[test]
    fn test_apply_creates_configured_ancestors() {
        let store = store();
        let leaf = store.registry().get_logger("p.q.r").unwrap();
        assert!(Logger::ptr_eq(&leaf.parent().unwrap(), &store.registry().root()));

        store.apply(ConfigurationSnapshot::new().with_level("p", Level::WARNING)).unwrap();
        assert_eq!(leaf.parent().unwrap().name(), "p");
        assert_eq!(leaf.effective_level(), Level::WARNING);
    }
}
