//! Configuration schema definitions.
//!
//! This module defines two shapes of the same information:
//! - `LoggingFile`: the serde document read from TOML files
//! - `ConfigurationSnapshot`: the immutable, validated form the core consumes
//!
//! A snapshot can also be viewed as a flat map of `ConfigKey -> ConfigValue`
//! entries, which is the granularity at which reload merge policies operate.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::level::Level;

/// Root TOML document.
///
/// ```toml
/// [root]
/// level = "INFO"
/// handlers = ["console"]
///
/// [loggers."com.example.db"]
/// level = "FINE"
/// handlers = ["audit"]
/// use_parent_handlers = false
///
/// [handlers.console]
/// kind = "console"
///
/// [handlers.audit]
/// kind = "file"
/// level = "WARNING"
/// path = "/var/log/audit.log"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LoggingFile {
    /// Directives for the root logger.
    pub root: RootConfig,

    /// Directives keyed by dotted logger name.
    pub loggers: BTreeMap<String, LoggerConfig>,

    /// Handler definitions keyed by handler id.
    pub handlers: BTreeMap<String, HandlerConfig>,
}

/// Root logger directives.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RootConfig {
    pub level: Option<String>,
    pub handlers: Option<Vec<String>>,
}

/// Directives for a named logger.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LoggerConfig {
    pub level: Option<String>,
    pub handlers: Option<Vec<String>>,
    pub use_parent_handlers: Option<bool>,
}

/// Handler definition. Every key other than `kind` and `level` is passed to
/// the handler factory as a string option.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HandlerConfig {
    pub kind: String,

    #[serde(default)]
    pub level: Option<String>,

    #[serde(flatten)]
    pub options: BTreeMap<String, toml::Value>,
}

/// A resolved handler definition.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerSpec {
    pub kind: String,
    pub level: Option<Level>,
    pub options: BTreeMap<String, String>,
}

impl HandlerSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            level: None,
            options: BTreeMap::new(),
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// Directives for one logger name. Absent fields leave the logger untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoggerDirective {
    pub level: Option<Level>,
    pub handlers: Option<Vec<String>>,
    pub use_parent_handlers: Option<bool>,
}

impl LoggerDirective {
    pub fn is_empty(&self) -> bool {
        self.level.is_none() && self.handlers.is_none() && self.use_parent_handlers.is_none()
    }
}

/// One property of the configuration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigKey {
    Level(String),
    Handlers(String),
    UseParentHandlers(String),
    /// A handler definition, keyed by handler id.
    Handler(String),
}

impl ConfigKey {
    /// The logger this key configures, if it is a logger property.
    pub fn logger_name(&self) -> Option<&str> {
        match self {
            ConfigKey::Level(n) | ConfigKey::Handlers(n) | ConfigKey::UseParentHandlers(n) => Some(n),
            ConfigKey::Handler(_) => None,
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigKey::Level(n) => write!(f, "{n}.level"),
            ConfigKey::Handlers(n) if n.is_empty() => f.write_str("handlers"),
            ConfigKey::Handlers(n) => write!(f, "{n}.handlers"),
            ConfigKey::UseParentHandlers(n) => write!(f, "{n}.useParentHandlers"),
            ConfigKey::Handler(id) => write!(f, "handler.{id}"),
        }
    }
}

/// Value stored under a `ConfigKey`.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Level(Level),
    Handlers(Vec<String>),
    Flag(bool),
    Handler(HandlerSpec),
}

/// Per-key resolution function: `(key, old, new) -> result`.
pub type MergeFn =
    dyn Fn(&ConfigKey, Option<&ConfigValue>, Option<&ConfigValue>) -> Option<ConfigValue> + Send + Sync;

/// How an incoming snapshot is combined with the active one.
#[derive(Clone, Default)]
pub enum MergePolicy {
    /// `(o, n) -> n`
    #[default]
    Replace,
    /// `(o, n) -> n.or(o)`
    PreferNew,
    /// `(o, n) -> o.or(n)`
    PreferOld,
    Custom(Arc<MergeFn>),
}

impl MergePolicy {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&ConfigKey, Option<&ConfigValue>, Option<&ConfigValue>) -> Option<ConfigValue> + Send + Sync + 'static,
    {
        MergePolicy::Custom(Arc::new(f))
    }

    fn resolve(&self, key: &ConfigKey, old: Option<&ConfigValue>, new: Option<&ConfigValue>) -> Option<ConfigValue> {
        match self {
            MergePolicy::Replace => new.cloned(),
            MergePolicy::PreferNew => new.or(old).cloned(),
            MergePolicy::PreferOld => old.or(new).cloned(),
            MergePolicy::Custom(f) => f(key, old, new),
        }
    }
}

impl fmt::Debug for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergePolicy::Replace => f.write_str("Replace"),
            MergePolicy::PreferNew => f.write_str("PreferNew"),
            MergePolicy::PreferOld => f.write_str("PreferOld"),
            MergePolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Immutable configuration state.
///
/// The root logger is configured under the name `""`.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationSnapshot {
    generation: u64,
    loggers: BTreeMap<String, LoggerDirective>,
    handlers: BTreeMap<String, HandlerSpec>,
}

impl PartialEq for ConfigurationSnapshot {
    /// Content equality; the generation stamp is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.loggers == other.loggers && self.handlers == other.handlers
    }
}

impl ConfigurationSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root at `INFO` with a single console handler.
    pub fn standard() -> Self {
        Self::new()
            .with_level("", Level::INFO)
            .with_handlers("", ["console"])
            .with_handler("console", HandlerSpec::new("console"))
    }

    pub fn with_level(mut self, logger: impl Into<String>, level: Level) -> Self {
        self.loggers.entry(logger.into()).or_default().level = Some(level);
        self
    }

    pub fn with_handlers<I, S>(mut self, logger: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.loggers.entry(logger.into()).or_default().handlers =
            Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_use_parent_handlers(mut self, logger: impl Into<String>, flag: bool) -> Self {
        self.loggers.entry(logger.into()).or_default().use_parent_handlers = Some(flag);
        self
    }

    pub fn with_handler(mut self, id: impl Into<String>, spec: HandlerSpec) -> Self {
        self.handlers.insert(id.into(), spec);
        self
    }

    /// Stamp assigned by the configuration store when the snapshot becomes
    /// active. Zero for snapshots that were never applied.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn stamped(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn directive(&self, logger: &str) -> Option<&LoggerDirective> {
        self.loggers.get(logger)
    }

    pub fn directives(&self) -> impl Iterator<Item = (&str, &LoggerDirective)> {
        self.loggers.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn handler(&self, id: &str) -> Option<&HandlerSpec> {
        self.handlers.get(id)
    }

    pub fn handler_specs(&self) -> impl Iterator<Item = (&str, &HandlerSpec)> {
        self.handlers.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// True if `logger` has a level or handlers directive.
    pub fn configures(&self, logger: &str) -> bool {
        self.loggers
            .get(logger)
            .is_some_and(|d| d.level.is_some() || d.handlers.is_some())
    }

    /// Handler definitions attached to `logger`, in directive order.
    /// `None` if the logger has no handlers directive; undefined ids are
    /// skipped.
    pub fn resolved_handlers(&self, logger: &str) -> Option<Vec<(String, HandlerSpec)>> {
        let ids = self.loggers.get(logger)?.handlers.as_ref()?;
        Some(
            ids.iter()
                .filter_map(|id| self.handlers.get(id).map(|spec| (id.clone(), spec.clone())))
                .collect(),
        )
    }

    /// Flat view of every property.
    pub fn entries(&self) -> BTreeMap<ConfigKey, ConfigValue> {
        let mut out = BTreeMap::new();
        for (name, d) in &self.loggers {
            if let Some(level) = &d.level {
                out.insert(ConfigKey::Level(name.clone()), ConfigValue::Level(level.clone()));
            }
            if let Some(ids) = &d.handlers {
                out.insert(ConfigKey::Handlers(name.clone()), ConfigValue::Handlers(ids.clone()));
            }
            if let Some(flag) = d.use_parent_handlers {
                out.insert(ConfigKey::UseParentHandlers(name.clone()), ConfigValue::Flag(flag));
            }
        }
        for (id, spec) in &self.handlers {
            out.insert(ConfigKey::Handler(id.clone()), ConfigValue::Handler(spec.clone()));
        }
        out
    }

    /// Rebuild a snapshot from flat entries. Entries whose value does not
    /// match the key's property are ignored.
    pub fn from_entries(entries: impl IntoIterator<Item = (ConfigKey, ConfigValue)>) -> Self {
        let mut snapshot = Self::new();
        for (key, value) in entries {
            match (key, value) {
                (ConfigKey::Level(n), ConfigValue::Level(l)) => {
                    snapshot.loggers.entry(n).or_default().level = Some(l);
                }
                (ConfigKey::Handlers(n), ConfigValue::Handlers(ids)) => {
                    snapshot.loggers.entry(n).or_default().handlers = Some(ids);
                }
                (ConfigKey::UseParentHandlers(n), ConfigValue::Flag(b)) => {
                    snapshot.loggers.entry(n).or_default().use_parent_handlers = Some(b);
                }
                (ConfigKey::Handler(id), ConfigValue::Handler(spec)) => {
                    snapshot.handlers.insert(id, spec);
                }
                (key, value) => {
                    tracing::warn!(key = %key, value = ?value, "Ignoring mismatched configuration entry");
                }
            }
        }
        snapshot
    }

    /// Combine `previous` and `next` key by key.
    pub fn merge(previous: &Self, next: &Self, policy: &MergePolicy) -> Self {
        if matches!(policy, MergePolicy::Replace) {
            return next.clone();
        }
        let old = previous.entries();
        let new = next.entries();
        let mut keys: Vec<&ConfigKey> = old.keys().chain(new.keys()).collect();
        keys.sort();
        keys.dedup();

        Self::from_entries(keys.into_iter().filter_map(|key| {
            policy
                .resolve(key, old.get(key), new.get(key))
                .map(|value| (key.clone(), value))
        }))
    }
}
