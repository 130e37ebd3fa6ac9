//! Process-wide entry point tying the registry and configuration store
//! together.
//!
//! `LogManager::global()` builds the shared instance on first use. Building
//! never calls back into `global()`, so a first use from inside handler or
//! factory code cannot recurse into initialization.

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::config::listeners::ConfigurationListener;
use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::{ConfigurationSnapshot, MergePolicy};
use crate::config::store::ConfigurationStore;
use crate::dispatch::ErrorSink;
use crate::error::{ListenerError, RegistryResult};
use crate::handler::HandlerFactory;
use crate::level::LevelTable;
use crate::logger::Logger;
use crate::record::LogRecord;
use crate::registry::{Registry, RegistrySettings};

static GLOBAL: ArcSwapOption<LogManager> = ArcSwapOption::const_empty();

pub struct LogManager {
    registry: Arc<Registry>,
    store: Arc<ConfigurationStore>,
    levels: LevelTable,
}

impl LogManager {
    pub fn new(settings: RegistrySettings) -> Self {
        Self::from_registry(Registry::new(settings))
    }

    pub fn with_parts(
        settings: RegistrySettings,
        factory: Arc<dyn HandlerFactory>,
        error_sink: Arc<dyn ErrorSink>,
    ) -> Self {
        Self::from_registry(Registry::with_parts(settings, factory, error_sink))
    }

    fn from_registry(registry: Registry) -> Self {
        let registry = Arc::new(registry);
        Self {
            store: Arc::new(ConfigurationStore::new(Arc::clone(&registry))),
            registry,
            levels: LevelTable::standard(),
        }
    }

    /// The shared manager, created with default settings on first use.
    ///
    /// Racing first callers each build a candidate; one is installed and the
    /// others are reset, closing their handlers, and discarded.
    pub fn global() -> Arc<LogManager> {
        if let Some(manager) = GLOBAL.load_full() {
            return manager;
        }
        install_once(&GLOBAL, Arc::new(LogManager::new(RegistrySettings::default())))
    }

    /// Drop the shared manager so the next `global()` builds a fresh one.
    #[doc(hidden)]
    pub fn reset_global() {
        GLOBAL.store(None);
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<ConfigurationStore> {
        &self.store
    }

    pub fn levels(&self) -> &LevelTable {
        &self.levels
    }

    pub fn logger(&self, name: &str) -> RegistryResult<Logger> {
        self.registry.get_logger(name)
    }

    pub fn root(&self) -> Logger {
        self.registry.root()
    }

    pub fn global_logger(&self) -> RegistryResult<Logger> {
        self.registry.global_logger()
    }

    pub fn anonymous_logger(&self) -> Logger {
        self.registry.anonymous_logger()
    }

    pub fn add_logger(&self, logger: Option<&Logger>) -> RegistryResult<bool> {
        self.registry.add_logger(logger)
    }

    pub fn logger_names(&self) -> Vec<String> {
        self.registry.logger_names()
    }

    pub fn publish(&self, logger: &Logger, record: Option<&LogRecord>) {
        self.registry.publish(logger, record);
    }

    pub fn apply(&self, snapshot: ConfigurationSnapshot) -> Result<(), ListenerError> {
        self.store.apply(snapshot)
    }

    pub fn apply_with(&self, snapshot: ConfigurationSnapshot, policy: &MergePolicy) -> Result<(), ListenerError> {
        self.store.apply_with(snapshot, policy)
    }

    /// Load `path` and apply it, replacing the current configuration.
    /// Listener failures are logged; the configuration stays applied.
    pub fn read_configuration(&self, path: &Path) -> Result<(), ConfigError> {
        let snapshot = load_config(path, &self.levels)?;
        if let Err(e) = self.store.apply(snapshot) {
            tracing::warn!(path = %path.display(), error = %e, "Configuration listeners failed");
        }
        Ok(())
    }

    pub fn reset(&self) {
        self.store.reset();
    }

    pub fn add_configuration_listener(&self, listener: Option<Arc<dyn ConfigurationListener>>) -> RegistryResult<()> {
        self.store.add_configuration_listener(listener)
    }

    pub fn remove_configuration_listener(
        &self,
        listener: Option<&Arc<dyn ConfigurationListener>>,
    ) -> RegistryResult<()> {
        self.store.remove_configuration_listener(listener)
    }
}

/// Put `candidate` into an empty `slot`, or close it down and return the
/// manager already there.
fn install_once(slot: &ArcSwapOption<LogManager>, candidate: Arc<LogManager>) -> Arc<LogManager> {
    let previous = slot.compare_and_swap(&None::<Arc<LogManager>>, Some(Arc::clone(&candidate)));
    match Option::clone(&previous) {
        Some(winner) => {
            candidate.reset();
            winner
        }
        None => {
            tracing::debug!("Global log manager initialized");
            candidate
        }
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new(RegistrySettings::default())
    }
}
