//! Log records handed to the dispatcher and on to handlers.

use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::level::Level;

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(0);
static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Stable 64-bit id of the calling thread.
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}

/// A single logging event.
#[derive(Clone)]
pub struct LogRecord {
    pub level: Level,
    pub logger_name: String,
    pub message: String,
    pub resource_bundle: Option<String>,
    /// Globally ordered across threads.
    pub sequence_number: u64,
    thread_id: u64,
    pub timestamp: SystemTime,
    pub thrown: Option<Arc<dyn Error + Send + Sync>>,
}

impl LogRecord {
    /// Create a record stamped with the next sequence number, the calling
    /// thread and the current time.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            logger_name: String::new(),
            message: message.into(),
            resource_bundle: None,
            sequence_number: NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            thread_id: current_thread_id(),
            timestamp: SystemTime::now(),
            thrown: None,
        }
    }

    pub fn with_logger(mut self, name: impl Into<String>) -> Self {
        self.logger_name = name.into();
        self
    }

    pub fn with_thrown(mut self, err: Arc<dyn Error + Send + Sync>) -> Self {
        self.thrown = Some(err);
        self
    }

    pub fn with_resource_bundle(mut self, bundle: impl Into<String>) -> Self {
        self.resource_bundle = Some(bundle.into());
        self
    }

    /// Canonical 64-bit thread id.
    pub fn thread_id(&self) -> u64 {
        self.thread_id
    }

    /// Lossy 32-bit view of the thread id.
    ///
    /// Ids that do not fit are folded into the negative range so that they
    /// never collide with a small id that does fit.
    pub fn thread_id_32(&self) -> i32 {
        if self.thread_id <= i32::MAX as u64 {
            self.thread_id as i32
        } else {
            -((self.thread_id % i32::MAX as u64) as i32) - 1
        }
    }

    pub fn set_thread_id(&mut self, id: u64) {
        self.thread_id = id;
    }

    /// Set the thread id from its 32-bit view. Negative values are kept as
    /// their two's-complement `u32` reinterpretation.
    pub fn set_thread_id_32(&mut self, id: i32) {
        self.thread_id = u64::from(id as u32);
    }
}

impl fmt::Debug for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogRecord")
            .field("level", &self.level)
            .field("logger_name", &self.logger_name)
            .field("message", &self.message)
            .field("sequence_number", &self.sequence_number)
            .field("thread_id", &self.thread_id)
            .field("thrown", &self.thrown.as_ref().map(|e| e.to_string()))
            .finish()
    }
}
