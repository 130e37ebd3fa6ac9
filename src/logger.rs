//! Logger nodes and the handle callers hold.
//!
//! # Responsibilities
//! - Hold a logger's explicit level, cached effective level, handlers and
//!   `use_parent_handlers` flag
//! - Link each node to its parent (strong) and children (weak)
//! - Propagate effective-level changes down to live children
//!
//! # Ownership
//! ```text
//! caller ──Arc──▶ node ──Arc──▶ parent ──Arc──▶ ... ──Arc──▶ root (pinned)
//!                  ▲                 │
//!                  └──── Weak ───────┘  (children list)
//! registry name table ──Weak──▶ node
//! ```
//! A node lives exactly as long as someone outside the registry (a caller, a
//! child, or a registry pin) holds it.
//!
//! Hierarchy mutations (level changes, re-parenting) serialize on a single
//! process-wide tree lock. Lock order: registry name tree → tree lock →
//! per-node children list.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use arc_swap::{ArcSwap, ArcSwapOption};
use parking_lot::Mutex;

use crate::config::schema::{HandlerSpec, LoggerDirective};
use crate::dispatch::{Dispatcher, ErrorSink, TracingErrorSink};
use crate::error::{RegistryError, RegistryResult};
use crate::handler::Handler;
use crate::level::Level;
use crate::record::LogRecord;
use crate::registry::reclaim::{ReclaimQueue, Reclaimed};

static TREE_LOCK: Mutex<()> = parking_lot::const_mutex(());
static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Effective level of a node that has neither a level nor a parent.
const DETACHED_LEVEL: Level = Level::INFO;

/// Check a dotted logger name. `""` (the root) is valid; empty segments are not.
pub fn validate_name(name: &str) -> RegistryResult<()> {
    if !name.is_empty() && name.split('.').any(str::is_empty) {
        return Err(RegistryError::MalformedName(name.to_string()));
    }
    Ok(())
}

/// Registry-provided context, set once when a node is registered.
pub(crate) struct Registration {
    pub(crate) reclaim: Arc<ReclaimQueue>,
    pub(crate) error_sink: Arc<dyn ErrorSink>,
    pub(crate) default_level: Level,
}

/// Configuration last applied to a node by the registry.
#[derive(Default)]
pub(crate) struct AppliedConfig {
    /// Zero until the first configuration pass.
    pub(crate) generation: u64,
    pub(crate) directive: LoggerDirective,
    pub(crate) handler_specs: Option<Vec<(String, HandlerSpec)>>,
    /// Definitions from `handler_specs` the factory could not build yet.
    pub(crate) failed: Vec<(String, HandlerSpec)>,
}

pub(crate) struct LoggerNode {
    pub(crate) id: u64,
    name: String,
    anonymous: bool,
    level: ArcSwapOption<Level>,
    effective: ArcSwap<Level>,
    handlers: ArcSwap<Vec<Arc<dyn Handler>>>,
    use_parent_handlers: AtomicBool,
    parent: ArcSwapOption<LoggerNode>,
    kids: Mutex<Vec<Weak<LoggerNode>>>,
    registration: OnceLock<Registration>,
    pub(crate) applied: Mutex<AppliedConfig>,
}

impl LoggerNode {
    fn new(name: String, anonymous: bool) -> Self {
        Self {
            id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            name,
            anonymous,
            level: ArcSwapOption::empty(),
            effective: ArcSwap::from_pointee(DETACHED_LEVEL),
            handlers: ArcSwap::from_pointee(Vec::new()),
            use_parent_handlers: AtomicBool::new(true),
            parent: ArcSwapOption::empty(),
            kids: Mutex::new(Vec::new()),
            registration: OnceLock::new(),
            applied: Mutex::new(AppliedConfig::default()),
        }
    }

    fn is_registered_root(&self) -> bool {
        self.name.is_empty() && !self.anonymous && self.registration.get().is_some()
    }

    fn live_kids(&self) -> Vec<Arc<LoggerNode>> {
        self.kids.lock().iter().filter_map(Weak::upgrade).collect()
    }

    pub(crate) fn prune_dead_kids(&self) {
        self.kids.lock().retain(|k| k.strong_count() > 0);
    }

    /// Recompute the cached effective level and push it down to children.
    ///
    /// Caller holds the tree lock. Strong references taken along the way are
    /// parked in `graveyard` so that no node is dropped under the lock.
    fn update_effective_level(&self, graveyard: &mut Vec<Arc<LoggerNode>>) {
        let new = match self.level.load_full() {
            Some(level) => level,
            None => match self.parent.load_full() {
                Some(parent) => {
                    let level = parent.effective.load_full();
                    graveyard.push(parent);
                    level
                }
                None => Arc::new(DETACHED_LEVEL),
            },
        };
        if self.effective.load().rank() == new.rank() {
            self.effective.store(new);
            return;
        }
        self.effective.store(new);

        let kids = self.live_kids();
        for kid in &kids {
            kid.update_effective_level(graveyard);
        }
        graveyard.extend(kids);
    }

    /// Move `self` under `parent`. Caller holds the tree lock.
    fn set_parent(self: &Arc<Self>, parent: &Arc<LoggerNode>, graveyard: &mut Vec<Arc<LoggerNode>>) {
        let me = Arc::as_ptr(self);
        if let Some(old) = self.parent.load_full() {
            if Arc::ptr_eq(&old, parent) {
                return;
            }
            old.kids
                .lock()
                .retain(|k| k.strong_count() > 0 && Weak::as_ptr(k) != me);
            graveyard.push(old);
        }
        parent.kids.lock().push(Arc::downgrade(self));
        if let Some(previous) = self.parent.swap(Some(Arc::clone(parent))) {
            graveyard.push(previous);
        }
        self.update_effective_level(graveyard);
    }
}

impl Drop for LoggerNode {
    fn drop(&mut self) {
        if self.anonymous {
            return;
        }
        if let Some(registration) = self.registration.get() {
            registration.reclaim.push(Reclaimed {
                name: std::mem::take(&mut self.name),
                id: self.id,
                parent: (*self.parent.load()).as_ref().map(Arc::downgrade),
            });
        }
    }
}

/// Handle to a logger node. Cloning is cheap; all clones refer to the same
/// node, and the node stays alive while any clone does.
#[derive(Clone)]
pub struct Logger {
    pub(crate) node: Arc<LoggerNode>,
}

impl Logger {
    /// Construct an unregistered logger, for use with `Registry::add_logger`.
    pub fn new(name: impl Into<String>) -> RegistryResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self::unchecked(name))
    }

    pub(crate) fn unchecked(name: String) -> Self {
        Self {
            node: Arc::new(LoggerNode::new(name, false)),
        }
    }

    pub(crate) fn anonymous() -> Self {
        Self {
            node: Arc::new(LoggerNode::new(String::new(), true)),
        }
    }

    /// Dotted name; `""` for the root and for anonymous loggers.
    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn is_anonymous(&self) -> bool {
        self.node.anonymous
    }

    /// True if both handles refer to the same node.
    pub fn ptr_eq(a: &Logger, b: &Logger) -> bool {
        Arc::ptr_eq(&a.node, &b.node)
    }

    /// Explicitly set level, if any.
    pub fn level(&self) -> Option<Level> {
        self.node.level.load_full().map(|l| l.as_ref().clone())
    }

    /// Set or clear the explicit level.
    ///
    /// Clearing the level of a registry's root resets it to the registry's
    /// default level instead; the root always has a level.
    pub fn set_level(&self, level: Option<Level>) {
        let level = match level {
            None if self.node.is_registered_root() => self
                .node
                .registration
                .get()
                .map(|r| r.default_level.clone()),
            other => other,
        };
        let mut graveyard = Vec::new();
        {
            let _tree = TREE_LOCK.lock();
            self.node.level.store(level.map(Arc::new));
            self.node.update_effective_level(&mut graveyard);
        }
        drop(graveyard);
    }

    /// Own level if set, otherwise the nearest ancestor's.
    pub fn effective_level(&self) -> Level {
        self.node.effective.load().as_ref().clone()
    }

    /// True if a record at `level` passes this logger's effective level.
    pub fn is_loggable(&self, level: &Level) -> bool {
        self.node.effective.load().admits(level)
    }

    /// Nearest registered ancestor (root for anonymous loggers).
    pub fn parent(&self) -> Option<Logger> {
        self.node.parent.load_full().map(|node| Logger { node })
    }

    /// Live children, in registration order.
    pub fn children(&self) -> Vec<Logger> {
        self.node
            .live_kids()
            .into_iter()
            .map(|node| Logger { node })
            .collect()
    }

    /// Copy of the current handler list.
    pub fn handlers(&self) -> Vec<Arc<dyn Handler>> {
        self.node.handlers.load().as_ref().clone()
    }

    pub fn add_handler(&self, handler: Arc<dyn Handler>) {
        self.node.handlers.rcu(|current| {
            let mut next = current.as_ref().clone();
            next.push(Arc::clone(&handler));
            next
        });
    }

    /// Remove one occurrence of `handler`. Returns false if it was not attached.
    /// The handler is not closed.
    pub fn remove_handler(&self, handler: &Arc<dyn Handler>) -> bool {
        let mut removed = false;
        self.node.handlers.rcu(|current| {
            let mut next = current.as_ref().clone();
            removed = match next.iter().position(|h| same_handler(h, handler)) {
                Some(pos) => {
                    next.remove(pos);
                    true
                }
                None => false,
            };
            next
        });
        removed
    }

    /// Detach every handler and return them.
    pub(crate) fn take_handlers(&self) -> Vec<Arc<dyn Handler>> {
        let old = self.node.handlers.swap(Arc::new(Vec::new()));
        old.as_ref().clone()
    }

    pub fn use_parent_handlers(&self) -> bool {
        self.node.use_parent_handlers.load(Ordering::Acquire)
    }

    pub fn set_use_parent_handlers(&self, flag: bool) {
        self.node.use_parent_handlers.store(flag, Ordering::Release);
    }

    /// Build a record for this logger and dispatch it.
    pub fn log(&self, level: Level, message: impl Into<String>) {
        if !self.is_loggable(&level) {
            return;
        }
        let record = LogRecord::new(level, message).with_logger(self.name());
        self.log_record(Some(&record));
    }

    /// Dispatch a record through this logger and its ancestors.
    pub fn log_record(&self, record: Option<&LogRecord>) {
        let sink: Arc<dyn ErrorSink> = match self.node.registration.get() {
            Some(r) => Arc::clone(&r.error_sink),
            None => Arc::new(TracingErrorSink),
        };
        Dispatcher::new(sink).publish(self, record);
    }

    pub fn severe(&self, message: impl Into<String>) {
        self.log(Level::SEVERE, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(Level::WARNING, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Level::INFO, message);
    }

    pub fn config(&self, message: impl Into<String>) {
        self.log(Level::CONFIG, message);
    }

    pub fn fine(&self, message: impl Into<String>) {
        self.log(Level::FINE, message);
    }

    pub fn finer(&self, message: impl Into<String>) {
        self.log(Level::FINER, message);
    }

    pub fn finest(&self, message: impl Into<String>) {
        self.log(Level::FINEST, message);
    }

    // --- Registry hooks ---

    /// Attach registry context. Returns false if the node already has one.
    pub(crate) fn register_with(&self, registration: Registration) -> bool {
        self.node.registration.set(registration).is_ok()
    }

    pub(crate) fn set_level_if_unset(&self, level: Level) {
        if self.node.level.load().is_none() {
            self.node.level.store(Some(Arc::new(level)));
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<LoggerNode> {
        Arc::downgrade(&self.node)
    }
}

/// Re-link nodes under the tree lock.
///
/// `node` is placed under `parent`, then each of `adopted` is moved under
/// `node`. Returns the references to drop once every lock is released.
pub(crate) fn link(
    node: &Arc<LoggerNode>,
    parent: Option<&Arc<LoggerNode>>,
    adopted: &[Arc<LoggerNode>],
) -> Vec<Arc<LoggerNode>> {
    let mut graveyard = Vec::new();
    let _tree = TREE_LOCK.lock();
    match parent {
        Some(parent) => node.set_parent(parent, &mut graveyard),
        None => node.update_effective_level(&mut graveyard),
    }
    for child in adopted {
        child.set_parent(node, &mut graveyard);
    }
    graveyard
}

/// Pointer identity for handlers, ignoring vtable differences.
pub(crate) fn same_handler(a: &Arc<dyn Handler>, b: &Arc<dyn Handler>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name())
            .field("level", &self.level())
            .field("effective_level", &self.effective_level())
            .field("handlers", &self.node.handlers.load().len())
            .field("use_parent_handlers", &self.use_parent_handlers())
            .finish()
    }
}
