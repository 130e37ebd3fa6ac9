//! Handlers: destinations that consume log records.
//!
//! # Responsibilities
//! - Define the `Handler` capability (level filter, publish, flush, close)
//! - Build handler instances from configuration via a `HandlerFactory`
//! - Ship the stock sinks: console, in-memory ring buffer, append-only file
//!
//! The core calls `close()` exactly once for every handler it removes from a
//! logger on reload or reset. Handlers added by callers are owned by the
//! logger they are attached to until removed.

pub mod console;
pub mod file;
pub mod memory;

use std::sync::Arc;
use std::time::UNIX_EPOCH;

use crate::config::schema::HandlerSpec;
use crate::error::HandlerError;
use crate::level::{Level, LevelTable};
use crate::record::LogRecord;

pub use console::ConsoleHandler;
pub use file::FileHandler;
pub use memory::MemoryHandler;

/// A destination for log records.
pub trait Handler: Send + Sync {
    /// Records below this level are not passed to `publish`.
    fn level(&self) -> Level;

    fn set_level(&self, level: Level);

    fn publish(&self, record: &LogRecord) -> Result<(), HandlerError>;

    fn flush(&self) -> Result<(), HandlerError>;

    /// Release the sink. Publishing after close fails with `HandlerError::Closed`.
    fn close(&self) -> Result<(), HandlerError>;
}

/// Builds handler instances from configuration specs.
pub trait HandlerFactory: Send + Sync {
    /// `id` is the handler's name in the configuration.
    fn create(&self, id: &str, spec: &HandlerSpec) -> Result<Arc<dyn Handler>, HandlerError>;
}

/// Factory for the stock handler kinds: `console`, `memory` and `file`.
///
/// Options:
/// - `memory`: `capacity` (default 1000), `push_level`
/// - `file`: `path` (required)
#[derive(Debug, Default, Clone)]
pub struct DefaultHandlerFactory {
    levels: LevelTable,
}

impl DefaultHandlerFactory {
    pub fn new(levels: LevelTable) -> Self {
        Self { levels }
    }

    fn level_option(&self, id: &str, spec: &HandlerSpec, option: &str) -> Result<Option<Level>, HandlerError> {
        match spec.options.get(option) {
            None => Ok(None),
            Some(value) => self.levels.find(value).map(Some).ok_or_else(|| HandlerError::InvalidOption {
                handler: id.to_string(),
                option: option.to_string(),
                reason: format!("unknown level {value:?}"),
            }),
        }
    }
}

impl HandlerFactory for DefaultHandlerFactory {
    fn create(&self, id: &str, spec: &HandlerSpec) -> Result<Arc<dyn Handler>, HandlerError> {
        let level = spec.level.clone().unwrap_or(Level::ALL);
        let handler: Arc<dyn Handler> = match spec.kind.as_str() {
            "console" => Arc::new(ConsoleHandler::new(level)),
            "memory" => {
                let capacity = match spec.options.get("capacity") {
                    None => memory::DEFAULT_CAPACITY,
                    Some(raw) => raw.trim().parse().map_err(|_| HandlerError::InvalidOption {
                        handler: id.to_string(),
                        option: "capacity".to_string(),
                        reason: format!("not a positive integer: {raw:?}"),
                    })?,
                };
                let handler = MemoryHandler::new(level, capacity);
                if let Some(push) = self.level_option(id, spec, "push_level")? {
                    handler.set_push_level(push);
                }
                Arc::new(handler)
            }
            "file" => {
                let path = spec.options.get("path").ok_or_else(|| HandlerError::InvalidOption {
                    handler: id.to_string(),
                    option: "path".to_string(),
                    reason: "missing".to_string(),
                })?;
                Arc::new(FileHandler::open(path, level)?)
            }
            other => return Err(HandlerError::UnknownKind(other.to_string())),
        };
        tracing::debug!(handler = %id, kind = %spec.kind, "Handler created");
        Ok(handler)
    }
}

/// One-line text rendering shared by the stock sinks.
pub(crate) fn format_line(record: &LogRecord) -> String {
    let millis = record
        .timestamp
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!(
        "{millis} [{}] {}: {}",
        record.level,
        if record.logger_name.is_empty() { "<root>" } else { &record.logger_name },
        record.message
    )
}
