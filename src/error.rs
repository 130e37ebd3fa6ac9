//! Error types for the registry, handlers and configuration listeners.
//!
//! Configuration parsing errors live in `config::loader` next to the parser.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// Errors surfaced synchronously by registry mutators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A required argument was absent.
    #[error("null argument: {0}")]
    NullArgument(&'static str),

    /// Empty dot segment in a logger name (e.g. "a..b", ".a", "a.").
    #[error("malformed logger name: {0:?}")]
    MalformedName(String),

    /// A second, distinct root node was offered to the registry.
    #[error("a root logger is already registered")]
    DuplicateRoot,

    /// The node already belongs to another registry.
    #[error("logger {0:?} is registered with another registry")]
    AlreadyRegistered(String),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors raised by handlers and handler construction.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The handler was used after `close()`.
    #[error("handler {0} is closed")]
    Closed(String),

    /// The handler refused the record.
    #[error("record rejected: {0}")]
    Rejected(String),

    /// No factory knows how to build this handler kind.
    #[error("unknown handler kind: {0}")]
    UnknownKind(String),

    /// Invalid or missing handler option.
    #[error("invalid option {option:?} for handler {handler}: {reason}")]
    InvalidOption {
        handler: String,
        option: String,
        reason: String,
    },

    /// The handler panicked while processing a record.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// A single failed configuration listener invocation.
#[derive(Debug, Error)]
pub enum ListenerFailure {
    #[error("listener failed: {0}")]
    Failed(Box<dyn StdError + Send + Sync>),

    #[error("listener panicked: {0}")]
    Panicked(String),
}

/// Aggregated failure of a listener batch.
///
/// `primary` is the first failure raised; every later failure is kept in
/// `suppressed`, in invocation order.
#[derive(Debug)]
pub struct ListenerError {
    pub primary: ListenerFailure,
    pub suppressed: Vec<ListenerFailure>,
}

impl fmt::Display for ListenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.primary)?;
        if !self.suppressed.is_empty() {
            write!(f, " ({} suppressed)", self.suppressed.len())?;
        }
        Ok(())
    }
}

impl StdError for ListenerError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.primary)
    }
}

/// Render a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
