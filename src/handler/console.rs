//! Console sink writing one line per record to stderr.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;

use crate::error::HandlerError;
use crate::handler::{format_line, Handler};
use crate::level::Level;
use crate::record::LogRecord;

pub struct ConsoleHandler {
    level: ArcSwap<Level>,
    closed: AtomicBool,
}

impl ConsoleHandler {
    pub fn new(level: Level) -> Self {
        Self {
            level: ArcSwap::from_pointee(level),
            closed: AtomicBool::new(false),
        }
    }
}

impl Handler for ConsoleHandler {
    fn level(&self) -> Level {
        self.level.load().as_ref().clone()
    }

    fn set_level(&self, level: Level) {
        self.level.store(level.into());
    }

    fn publish(&self, record: &LogRecord) -> Result<(), HandlerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(HandlerError::Closed("console".into()));
        }
        let mut err = std::io::stderr().lock();
        writeln!(err, "{}", format_line(record))?;
        Ok(())
    }

    fn flush(&self) -> Result<(), HandlerError> {
        std::io::stderr().flush()?;
        Ok(())
    }

    fn close(&self) -> Result<(), HandlerError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.flush()?;
        }
        Ok(())
    }
}
