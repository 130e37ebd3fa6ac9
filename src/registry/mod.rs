//! Named logger registry.
//!
//! # Responsibilities
//! - Map dotted names to live logger nodes (at most one per name)
//! - Link new nodes under their nearest live ancestor and adopt the nearest
//!   live descendants
//! - Apply the current configuration snapshot to each node exactly once per
//!   generation
//! - Drop name entries of reclaimed nodes in bounded batches
//!
//! # Data Flow
//! ```text
//! get_logger(name)
//!     → names (DashMap, Weak) ── hit ──▶ Logger
//!     → miss: create configured ancestors
//!           → tree lock: re-check, link parent/children, publish name
//!           → configure node from the latest snapshot (no registry lock),
//!             creating its configured ancestors if that snapshot is newer
//! ```
//!
//! # Design Decisions
//! - Lookups of existing names never take the tree lock
//! - Handler factories, handler `close()` and listeners never run under the
//!   tree lock or the hierarchy lock
//! - References upgraded under a lock are dropped after it is released, so a
//!   node destructor never runs while a registry lock is held
//!
//! Lock order: store config lock → node config lock → tree lock → hierarchy
//! lock → leaf locks (name shards, children lists, handler lists, reclaim
//! queue, pin list).

pub(crate) mod reclaim;
pub(crate) mod tree;

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::config::schema::{ConfigurationSnapshot, HandlerSpec};
use crate::dispatch::{Dispatcher, ErrorSink, TracingErrorSink};
use crate::error::{panic_message, HandlerError, RegistryError, RegistryResult};
use crate::handler::{DefaultHandlerFactory, Handler, HandlerFactory};
use crate::level::Level;
use crate::logger::{link, validate_name, AppliedConfig, Logger, LoggerNode, Registration};
use crate::observability::metrics;
use crate::record::LogRecord;

use reclaim::ReclaimQueue;
use tree::{Entry, NameTree};

/// Name of the always-present system logger.
pub const GLOBAL_LOGGER_NAME: &str = "global";

/// Reclaimed entries processed per sweep.
pub const DEFAULT_RECLAIM_BATCH: usize = 400;

/// Construction-time registry settings.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Root level before configuration and after `reset`.
    pub default_level: Level,
    /// Configuration in effect at construction.
    pub initial: ConfigurationSnapshot,
    /// Loggers created eagerly and kept alive for the registry's lifetime.
    pub system_loggers: Vec<String>,
    pub reclaim_batch: usize,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            initial: ConfigurationSnapshot::standard(),
            system_loggers: vec![GLOBAL_LOGGER_NAME.to_string()],
            reclaim_batch: DEFAULT_RECLAIM_BATCH,
        }
    }
}

pub struct Registry {
    names: DashMap<String, Entry>,
    tree: Mutex<NameTree>,
    root: Logger,
    system: Vec<Logger>,
    /// Loggers holding handlers created from configuration.
    pinned: Mutex<Vec<Logger>>,
    reclaim: Arc<ReclaimQueue>,
    snapshot: ArcSwap<ConfigurationSnapshot>,
    factory: Arc<dyn HandlerFactory>,
    error_sink: Arc<dyn ErrorSink>,
    dispatcher: Dispatcher,
    default_level: Level,
    reclaim_batch: usize,
}

impl Registry {
    /// Registry with the stock handler factory and a `tracing` error sink.
    pub fn new(settings: RegistrySettings) -> Self {
        Self::with_parts(
            settings,
            Arc::new(DefaultHandlerFactory::default()),
            Arc::new(TracingErrorSink),
        )
    }

    pub fn with_parts(
        settings: RegistrySettings,
        factory: Arc<dyn HandlerFactory>,
        error_sink: Arc<dyn ErrorSink>,
    ) -> Self {
        let RegistrySettings {
            default_level,
            initial,
            system_loggers,
            reclaim_batch,
        } = settings;

        let reclaim = Arc::new(ReclaimQueue::new());
        let root = Logger::unchecked(String::new());
        root.set_level_if_unset(default_level.clone());
        root.register_with(Registration {
            reclaim: Arc::clone(&reclaim),
            error_sink: Arc::clone(&error_sink),
            default_level: default_level.clone(),
        });
        drop(link(&root.node, None, &[]));

        let entry = Entry {
            id: root.node.id,
            node: root.downgrade(),
        };
        let mut tree = NameTree::new();
        tree.set_entry("", entry.clone());
        let names = DashMap::new();
        names.insert(String::new(), entry);

        let mut registry = Self {
            names,
            tree: Mutex::new(tree),
            root,
            system: Vec::new(),
            pinned: Mutex::new(Vec::new()),
            reclaim,
            snapshot: ArcSwap::from_pointee(initial.stamped(1)),
            factory,
            dispatcher: Dispatcher::new(Arc::clone(&error_sink)),
            error_sink,
            default_level,
            reclaim_batch: reclaim_batch.max(1),
        };

        let snapshot = registry.snapshot();
        let mut closer = CloseSet::default();
        registry.configure(&registry.root, &snapshot, false, &mut closer);

        let mut system = Vec::with_capacity(system_loggers.len());
        for name in &system_loggers {
            match registry.get_logger(name) {
                Ok(logger) => system.push(logger),
                Err(e) => tracing::warn!(logger = %name, error = %e, "Skipping invalid system logger"),
            }
        }
        registry.system = system;

        tracing::debug!(
            default_level = %registry.default_level,
            system_loggers = registry.system.len(),
            "Logger registry initialized"
        );
        registry
    }

    /// The root logger (`""`).
    pub fn root(&self) -> Logger {
        self.root.clone()
    }

    /// The `"global"` logger.
    pub fn global_logger(&self) -> RegistryResult<Logger> {
        self.get_logger(GLOBAL_LOGGER_NAME)
    }

    /// Return the live logger named `name`, creating and linking it if needed.
    ///
    /// Concurrent callers with the same name receive the same node.
    pub fn get_logger(&self, name: &str) -> RegistryResult<Logger> {
        validate_name(name)?;
        if name.is_empty() {
            return Ok(self.root.clone());
        }
        if let Some(found) = self.find(name) {
            return Ok(found);
        }
        let candidate = Logger::unchecked(name.to_string());
        match self.insert(&candidate)? {
            Some(existing) => Ok(existing),
            None => Ok(candidate),
        }
    }

    /// Register a caller-constructed logger.
    ///
    /// Returns `Ok(false)` if a live logger with the same name is already
    /// registered (including this one).
    pub fn add_logger(&self, logger: Option<&Logger>) -> RegistryResult<bool> {
        let logger = logger.ok_or(RegistryError::NullArgument("logger"))?;
        let name = logger.name();
        if name.is_empty() {
            if Logger::ptr_eq(logger, &self.root) {
                return Ok(false);
            }
            return Err(RegistryError::DuplicateRoot);
        }
        if self.find(name).is_some() {
            return Ok(false);
        }
        Ok(self.insert(logger)?.is_none())
    }

    /// A fresh logger parented to the root and never entered in the name table.
    pub fn anonymous_logger(&self) -> Logger {
        let logger = Logger::anonymous();
        logger.register_with(self.registration());
        drop(link(&logger.node, Some(&self.root.node), &[]));
        logger
    }

    /// Live logger for `name`, without creating one.
    pub fn find(&self, name: &str) -> Option<Logger> {
        self.names
            .get(name)
            .and_then(|entry| entry.node.upgrade())
            .map(|node| Logger { node })
    }

    /// Names with a live logger, sorted. Always includes `""`.
    pub fn logger_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .names
            .iter()
            .filter(|entry| entry.value().node.strong_count() > 0)
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub(crate) fn live_loggers(&self) -> Vec<Logger> {
        self.names
            .iter()
            .filter_map(|entry| entry.value().node.upgrade())
            .map(|node| Logger { node })
            .collect()
    }

    /// Current configuration snapshot.
    pub fn snapshot(&self) -> Arc<ConfigurationSnapshot> {
        self.snapshot.load_full()
    }

    pub(crate) fn install_snapshot(&self, snapshot: Arc<ConfigurationSnapshot>) {
        self.snapshot.store(snapshot);
    }

    pub fn default_level(&self) -> &Level {
        &self.default_level
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Dispatch `record` through `logger`'s handler chain.
    pub fn publish(&self, logger: &Logger, record: Option<&LogRecord>) {
        self.dispatcher.publish(logger, record);
    }

    /// Remove name entries of reclaimed loggers, at most one batch.
    /// Returns the number of entries processed.
    pub fn sweep(&self) -> usize {
        let batch = self.reclaim.drain(self.reclaim_batch);
        if batch.is_empty() {
            return 0;
        }

        let mut held: Vec<Arc<LoggerNode>> = Vec::new();
        {
            let mut tree = self.tree.lock();
            for item in &batch {
                self.names.remove_if(&item.name, |_, entry| entry.id == item.id);
                tree.clear_entry(&item.name, item.id);
                if let Some(parent) = item.parent.as_ref().and_then(|p| p.upgrade()) {
                    parent.prune_dead_kids();
                    held.push(parent);
                }
            }
        }
        drop(held);

        metrics::record_reclaimed(batch.len());
        metrics::record_live_loggers(self.names.len());
        tracing::debug!(reclaimed = batch.len(), pending = self.reclaim.len(), "Swept reclaimed loggers");
        batch.len()
    }

    fn registration(&self) -> Registration {
        Registration {
            reclaim: Arc::clone(&self.reclaim),
            error_sink: Arc::clone(&self.error_sink),
            default_level: self.default_level.clone(),
        }
    }

    /// Publish `logger` under its name. Returns the existing logger if the
    /// name is already taken by a live node.
    fn insert(&self, logger: &Logger) -> RegistryResult<Option<Logger>> {
        let name = logger.name().to_string();
        let snapshot = self.snapshot();
        // Kept alive until `logger` is linked beneath them.
        let _ancestors = self.configured_ancestors(&name, &snapshot)?;
        self.sweep();

        let keep_level = logger.level().is_some();
        let mut held: Vec<Arc<LoggerNode>> = Vec::new();
        {
            let mut tree = self.tree.lock();
            if let Some(existing) = self.find(&name) {
                return Ok(Some(existing));
            }
            if !logger.register_with(self.registration()) {
                return Err(RegistryError::AlreadyRegistered(name));
            }
            if let Some(level) = snapshot.directive(&name).and_then(|d| d.level.clone()) {
                logger.set_level_if_unset(level);
            }

            let entry = Entry {
                id: logger.node.id,
                node: logger.downgrade(),
            };
            let parent = tree.nearest_live_ancestor(&name, &mut held);
            let adopted = tree.child_boundary(&name);
            tree.set_entry(&name, entry.clone());
            held.extend(link(&logger.node, parent.as_ref(), &adopted));
            held.extend(parent);
            held.extend(adopted);
            self.names.insert(name.clone(), entry);
        }
        drop(held);

        metrics::record_logger_created();
        tracing::debug!(logger = %name, "Logger registered");

        // An apply that enumerated live loggers before this one was published
        // did not create its configured ancestors.
        let latest = self.snapshot();
        let _late_ancestors = if latest.generation() == snapshot.generation() {
            Vec::new()
        } else {
            self.configured_ancestors(&name, &latest).unwrap_or_else(|e| {
                tracing::warn!(logger = %name, error = %e, "Failed to create configured ancestor");
                Vec::new()
            })
        };
        let mut closer = CloseSet::default();
        self.configure(logger, &latest, keep_level, &mut closer);
        Ok(None)
    }

    /// Create (or find) every proper ancestor of `name` that `snapshot`
    /// configures, shortest first.
    fn configured_ancestors(&self, name: &str, snapshot: &ConfigurationSnapshot) -> RegistryResult<Vec<Logger>> {
        let mut ancestors = Vec::new();
        for (dot, _) in name.match_indices('.') {
            let prefix = &name[..dot];
            if snapshot.configures(prefix) {
                ancestors.push(self.get_logger(prefix)?);
            }
        }
        Ok(ancestors)
    }

    /// Make sure configured ancestors of every live logger exist.
    pub(crate) fn adopt_configured_ancestors(&self, loggers: &[Logger], snapshot: &ConfigurationSnapshot) {
        for logger in loggers {
            if logger.name().is_empty() {
                continue;
            }
            if let Err(e) = self.configured_ancestors(logger.name(), snapshot) {
                tracing::warn!(logger = %logger.name(), error = %e, "Failed to create configured ancestor");
            }
        }
    }

    /// Bring `logger` in line with `snapshot`, once per generation.
    ///
    /// - Level: applied when added or changed; a removed level is left as is.
    ///   On the first pass, an explicitly set level (`keep_level`) wins.
    /// - `use_parent_handlers`: set to the new value, or `true` when removed.
    /// - Handlers: when the resolved definitions change, handlers installed by
    ///   an earlier pass are closed (once) and replacements are created.
    pub(crate) fn configure(
        &self,
        logger: &Logger,
        snapshot: &ConfigurationSnapshot,
        keep_level: bool,
        closer: &mut CloseSet,
    ) {
        let mut applied = logger.node.applied.lock();
        if applied.generation >= snapshot.generation() {
            return;
        }
        let first = applied.generation == 0;
        let name = logger.name();
        let new = snapshot.directive(name).cloned().unwrap_or_default();
        let old = std::mem::take(&mut applied.directive);

        if new.level != old.level {
            if let Some(level) = &new.level {
                if !(first && keep_level) {
                    logger.set_level(Some(level.clone()));
                }
            }
        }

        if new.use_parent_handlers != old.use_parent_handlers {
            logger.set_use_parent_handlers(new.use_parent_handlers.unwrap_or(true));
        }

        let specs = snapshot.resolved_handlers(name);
        if specs != applied.handler_specs {
            if applied.handler_specs.is_some() {
                for handler in logger.take_handlers() {
                    closer.close(&handler, name, self.error_sink.as_ref());
                }
            }
            let wanted = specs.as_deref().unwrap_or_default();
            applied.failed = self.install_handlers(logger, wanted);
            if applied.failed.len() < wanted.len() {
                self.pin(logger);
            } else {
                self.unpin(logger);
            }
            applied.handler_specs = specs;
        } else if !applied.failed.is_empty() {
            let retry = std::mem::take(&mut applied.failed);
            applied.failed = self.install_handlers(logger, &retry);
            if applied.failed.len() < retry.len() {
                self.pin(logger);
            }
        }

        applied.generation = snapshot.generation();
        applied.directive = new;
    }

    /// Create and attach a handler per definition. Returns the definitions
    /// the factory rejected.
    fn install_handlers(&self, logger: &Logger, specs: &[(String, HandlerSpec)]) -> Vec<(String, HandlerSpec)> {
        let mut failed = Vec::new();
        for (id, spec) in specs {
            match self.factory.create(id, spec) {
                Ok(handler) => logger.add_handler(handler),
                Err(e) => {
                    tracing::warn!(logger = %logger.name(), handler = %id, error = %e, "Could not create handler");
                    self.error_sink.report(logger.name(), &e);
                    failed.push((id.clone(), spec.clone()));
                }
            }
        }
        failed
    }

    /// Close every handler on `logger` and clear its level (the root gets the
    /// default level back).
    pub(crate) fn reset_logger(&self, logger: &Logger, snapshot: &ConfigurationSnapshot, closer: &mut CloseSet) {
        let mut applied = logger.node.applied.lock();
        for handler in logger.take_handlers() {
            closer.close(&handler, logger.name(), self.error_sink.as_ref());
        }
        if Logger::ptr_eq(logger, &self.root) {
            logger.set_level(Some(self.default_level.clone()));
        } else {
            logger.set_level(None);
        }
        *applied = AppliedConfig {
            generation: snapshot.generation(),
            ..AppliedConfig::default()
        };
    }

    fn pin(&self, logger: &Logger) {
        let mut pinned = self.pinned.lock();
        if !pinned.iter().any(|p| Logger::ptr_eq(p, logger)) {
            pinned.push(logger.clone());
        }
    }

    fn unpin(&self, logger: &Logger) {
        self.pinned.lock().retain(|p| !Logger::ptr_eq(p, logger));
    }

    /// Release every configuration pin. The caller drops the result outside
    /// any registry lock.
    pub(crate) fn take_pins(&self) -> Vec<Logger> {
        std::mem::take(&mut *self.pinned.lock())
    }

    #[cfg(test)]
    pub(crate) fn pinned_count(&self) -> usize {
        self.pinned.lock().len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistrySettings::default())
    }
}

/// Handlers closed during one configuration pass. Each handler is closed at
/// most once and kept alive until the pass ends.
#[derive(Default)]
pub(crate) struct CloseSet {
    seen: HashSet<usize>,
    closed: Vec<Arc<dyn Handler>>,
}

impl CloseSet {
    pub(crate) fn close(&mut self, handler: &Arc<dyn Handler>, logger: &str, sink: &dyn ErrorSink) {
        let key = Arc::as_ptr(handler) as *const () as usize;
        if !self.seen.insert(key) {
            return;
        }
        self.closed.push(Arc::clone(handler));
        match catch_unwind(AssertUnwindSafe(|| handler.close())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => sink.report(logger, &e),
            Err(payload) => sink.report(logger, &HandlerError::Panicked(panic_message(&*payload))),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.closed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::MemoryHandler;

    fn quiet() -> RegistrySettings {
        RegistrySettings {
            initial: ConfigurationSnapshot::new(),
            ..RegistrySettings::default()
        }
    }

    #[test]
    fn test_root_and_global_exist() {
        let reg = Registry::new(quiet());
        assert_eq!(reg.root().level(), Some(Level::INFO));
        assert_eq!(reg.logger_names(), vec!["".to_string(), "global".to_string()]);
        let global = reg.global_logger().unwrap();
        assert!(Logger::ptr_eq(&global.parent().unwrap(), &reg.root()));
    }

    #[test]
    fn test_standard_config_installs_console_on_root() {
        let reg = Registry::default();
        assert_eq!(reg.root().handlers().len(), 1);
        assert_eq!(reg.pinned_count(), 1);
    }

    #[test]
    fn test_get_logger_same_instance() {
        let reg = Registry::new(quiet());
        let a = reg.get_logger("a.b").unwrap();
        let b = reg.get_logger("a.b").unwrap();
        assert!(Logger::ptr_eq(&a, &b));
        assert!(Logger::ptr_eq(&reg.get_logger("").unwrap(), &reg.root()));
    }

    #[test]
    fn test_malformed_name_rejected() {
        let reg = Registry::new(quiet());
        assert!(matches!(reg.get_logger("a..b"), Err(RegistryError::MalformedName(_))));
        assert!(matches!(reg.get_logger(".a"), Err(RegistryError::MalformedName(_))));
    }

    #[test]
    fn test_parent_links_to_nearest_live_ancestor() {
        let reg = Registry::new(quiet());
        let leaf = reg.get_logger("x.y.z").unwrap();
        assert!(Logger::ptr_eq(&leaf.parent().unwrap(), &reg.root()));

        let x = reg.get_logger("x").unwrap();
        assert!(Logger::ptr_eq(&leaf.parent().unwrap(), &x));

        let xy = reg.get_logger("x.y").unwrap();
        assert!(Logger::ptr_eq(&leaf.parent().unwrap(), &xy));
        assert!(Logger::ptr_eq(&xy.parent().unwrap(), &x));
    }

    #[test]
    fn test_add_logger_cases() {
        let reg = Registry::new(quiet());
        assert_eq!(reg.add_logger(None), Err(RegistryError::NullArgument("logger")));

        let mine = Logger::new("mine").unwrap();
        mine.set_level(Some(Level::FINE));
        assert_eq!(reg.add_logger(Some(&mine)), Ok(true));
        assert_eq!(reg.add_logger(Some(&mine)), Ok(false));
        assert_eq!(mine.level(), Some(Level::FINE));
        assert!(Logger::ptr_eq(&reg.get_logger("mine").unwrap(), &mine));

        let impostor = Logger::new("mine").unwrap();
        assert_eq!(reg.add_logger(Some(&impostor)), Ok(false));

        let fake_root = Logger::new("").unwrap();
        assert_eq!(reg.add_logger(Some(&fake_root)), Err(RegistryError::DuplicateRoot));
        assert_eq!(reg.add_logger(Some(&reg.root())), Ok(false));

        let other = Registry::new(quiet());
        assert_eq!(
            other.add_logger(Some(&mine)),
            Err(RegistryError::AlreadyRegistered("mine".to_string()))
        );
    }

    #[test]
    fn test_dead_entries_are_swept() {
        let reg = Registry::new(quiet());
        {
            let _tmp = reg.get_logger("tmp.one").unwrap();
            assert!(reg.logger_names().contains(&"tmp.one".to_string()));
        }
        assert!(!reg.logger_names().contains(&"tmp.one".to_string()));
        assert_eq!(reg.sweep(), 1);
        assert!(reg.find("tmp.one").is_none());

        let again = reg.get_logger("tmp.one").unwrap();
        assert!(reg.find("tmp.one").is_some());
        drop(again);
    }

    #[test]
    fn test_configured_ancestor_created_on_demand() {
        let settings = RegistrySettings {
            initial: ConfigurationSnapshot::new().with_level("svc", Level::SEVERE),
            ..RegistrySettings::default()
        };
        let reg = Registry::new(settings);
        let child = reg.get_logger("svc.db.pool").unwrap();
        let parent = child.parent().unwrap();
        assert_eq!(parent.name(), "svc");
        assert_eq!(child.effective_level(), Level::SEVERE);
    }

    #[test]
    fn test_anonymous_logger() {
        let reg = Registry::new(quiet());
        let anon = reg.anonymous_logger();
        assert!(anon.is_anonymous());
        assert!(Logger::ptr_eq(&anon.parent().unwrap(), &reg.root()));
        assert_eq!(reg.logger_names().len(), 2);
        drop(anon);
        assert_eq!(reg.sweep(), 0);
    }

    #[test]
    fn test_close_set_closes_once() {
        let mem: Arc<dyn Handler> = Arc::new(MemoryHandler::new(Level::ALL, 1));
        let mut closer = CloseSet::default();
        closer.close(&mem, "x", &TracingErrorSink);
        closer.close(&mem, "y", &TracingErrorSink);
        assert_eq!(closer.len(), 1);
    }
}
