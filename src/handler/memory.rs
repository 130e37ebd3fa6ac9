//! In-memory ring buffer with an optional cascade target.
//!
//! # Responsibilities
//! - Keep the most recent `capacity` records
//! - When a record at or above `push_level` arrives, push the whole buffer
//!   to the target handler (if any) and empty it
//! - Without a target the buffer only retains records, which makes it the
//!   handler of choice for inspecting dispatch in tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::error::HandlerError;
use crate::handler::Handler;
use crate::level::Level;
use crate::record::LogRecord;

pub const DEFAULT_CAPACITY: usize = 1000;

pub struct MemoryHandler {
    level: ArcSwap<Level>,
    push_level: ArcSwap<Level>,
    capacity: usize,
    buffer: Mutex<VecDeque<LogRecord>>,
    target: Option<Arc<dyn Handler>>,
    closed: AtomicBool,
}

impl MemoryHandler {
    /// A retaining buffer with no target. `capacity` of zero is raised to one.
    pub fn new(level: Level, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            level: ArcSwap::from_pointee(level),
            push_level: ArcSwap::from_pointee(Level::OFF),
            capacity,
            buffer: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            target: None,
            closed: AtomicBool::new(false),
        }
    }

    /// A buffer that cascades to `target` once a record reaches `push_level`.
    pub fn with_target(level: Level, capacity: usize, push_level: Level, target: Arc<dyn Handler>) -> Self {
        let mut handler = Self::new(level, capacity);
        handler.push_level = ArcSwap::from_pointee(push_level);
        handler.target = Some(target);
        handler
    }

    pub fn set_push_level(&self, level: Level) {
        self.push_level.store(level.into());
    }

    pub fn push_level(&self) -> Level {
        self.push_level.load().as_ref().clone()
    }

    /// Snapshot of the buffered records, oldest first.
    pub fn records(&self) -> Vec<LogRecord> {
        self.buffer.lock().iter().cloned().collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.buffer.lock().iter().map(|r| r.message.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.buffer.lock().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Send every buffered record to the target and empty the buffer.
    ///
    /// The buffer lock is released before the target is called. A failing
    /// record does not stop the rest; the first error is returned.
    pub fn push(&self) -> Result<(), HandlerError> {
        let Some(target) = &self.target else {
            return Ok(());
        };
        let drained: Vec<LogRecord> = self.buffer.lock().drain(..).collect();
        let mut first_error = None;
        for record in &drained {
            if target.level().admits(&record.level) {
                if let Err(e) = target.publish(record) {
                    first_error.get_or_insert(e);
                }
            }
        }
        let flushed = target.flush();
        match first_error {
            Some(e) => Err(e),
            None => flushed,
        }
    }
}

impl Handler for MemoryHandler {
    fn level(&self) -> Level {
        self.level.load().as_ref().clone()
    }

    fn set_level(&self, level: Level) {
        self.level.store(level.into());
    }

    fn publish(&self, record: &LogRecord) -> Result<(), HandlerError> {
        if self.is_closed() {
            return Err(HandlerError::Closed("memory".into()));
        }
        {
            let mut buffer = self.buffer.lock();
            if buffer.len() == self.capacity {
                buffer.pop_front();
            }
            buffer.push_back(record.clone());
        }
        if self.target.is_some() && self.push_level.load().admits(&record.level) {
            self.push()?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), HandlerError> {
        match &self.target {
            Some(target) => target.flush(),
            None => Ok(()),
        }
    }

    fn close(&self) -> Result<(), HandlerError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        match &self.target {
            Some(target) => target.close(),
            None => Ok(()),
        }
    }
}
