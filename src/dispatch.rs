//! Record dispatch through the logger hierarchy.
//!
//! # Data Flow
//! ```text
//! publish(logger, record)
//!     → effective-level gate
//!     → logger.handlers (each gated by handler level)
//!     → parent.handlers ... while use_parent_handlers
//! ```
//!
//! A failing or panicking handler is reported to the `ErrorSink` and does not
//! stop delivery to the remaining handlers. No registry lock is held while a
//! handler runs.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{panic_message, HandlerError};
use crate::level::Level;
use crate::logger::Logger;
use crate::observability::metrics;
use crate::record::LogRecord;

/// Destination for handler failures.
pub trait ErrorSink: Send + Sync {
    fn report(&self, logger: &str, error: &HandlerError);
}

/// Reports handler failures as `tracing` error events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, logger: &str, error: &HandlerError) {
        tracing::error!(logger = %logger, error = %error, "Handler failed");
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    sink: Arc<dyn ErrorSink>,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn ErrorSink>) -> Self {
        Self { sink }
    }

    /// Effective level of `logger`: its own, or the nearest ancestor's.
    pub fn resolve(logger: &Logger) -> Level {
        logger.effective_level()
    }

    /// Deliver `record` to `logger`'s handlers and, while
    /// `use_parent_handlers` holds, to each ancestor's. `None` is a no-op.
    pub fn publish(&self, logger: &Logger, record: Option<&LogRecord>) {
        let Some(record) = record else {
            return;
        };
        if !logger.is_loggable(&record.level) {
            return;
        }

        let mut current = Some(logger.clone());
        while let Some(node) = current {
            for handler in node.handlers() {
                if !handler.level().admits(&record.level) {
                    continue;
                }
                let outcome = catch_unwind(AssertUnwindSafe(|| handler.publish(record)));
                match outcome {
                    Ok(Ok(())) => metrics::record_published(),
                    Ok(Err(e)) => self.fail(node.name(), &e),
                    Err(payload) => self.fail(node.name(), &HandlerError::Panicked(panic_message(&*payload))),
                }
            }
            if !node.use_parent_handlers() {
                break;
            }
            current = node.parent();
        }
    }

    fn fail(&self, logger: &str, error: &HandlerError) {
        metrics::record_handler_failure();
        self.sink.report(logger, error);
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Arc::new(TracingErrorSink))
    }
}
