//! Shared utilities for integration and stress testing.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use logtree::config::HandlerSpec;
use logtree::{
    ConfigurationSnapshot, ErrorSink, Handler, HandlerError, HandlerFactory, Level, LogManager, LogRecord,
    RegistrySettings,
};

/// Handler that keeps every record and counts `close()` calls.
pub struct RecordingHandler {
    pub id: String,
    pub kind: String,
    level: Mutex<Level>,
    records: Mutex<Vec<LogRecord>>,
    closes: AtomicUsize,
}

impl RecordingHandler {
    pub fn new(id: &str, kind: &str, level: Level) -> Self {
        Self {
            id: id.to_string(),
            kind: kind.to_string(),
            level: Mutex::new(level),
            records: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.records.lock().iter().map(|r| r.message.clone()).collect()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Handler for RecordingHandler {
    fn level(&self) -> Level {
        self.level.lock().clone()
    }

    fn set_level(&self, level: Level) {
        *self.level.lock() = level;
    }

    fn publish(&self, record: &LogRecord) -> Result<(), HandlerError> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn flush(&self) -> Result<(), HandlerError> {
        Ok(())
    }

    fn close(&self) -> Result<(), HandlerError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory producing `RecordingHandler`s and remembering each one.
///
/// Kind `"broken"` always fails; kind `"flaky"` fails while the factory is
/// offline.
#[derive(Default)]
pub struct CountingFactory {
    created: Mutex<Vec<Arc<RecordingHandler>>>,
    offline: AtomicBool,
}

impl CountingFactory {
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<Arc<RecordingHandler>> {
        self.created.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.created.lock().len()
    }

    pub fn count_kind(&self, kind: &str) -> usize {
        self.created.lock().iter().filter(|h| h.kind == kind).count()
    }
}

impl HandlerFactory for CountingFactory {
    fn create(&self, id: &str, spec: &HandlerSpec) -> Result<Arc<dyn Handler>, HandlerError> {
        if spec.kind == "broken" {
            return Err(HandlerError::UnknownKind(spec.kind.clone()));
        }
        if spec.kind == "flaky" && self.offline.load(Ordering::SeqCst) {
            return Err(HandlerError::Rejected(format!("{id} unavailable")));
        }
        let handler = Arc::new(RecordingHandler::new(
            id,
            &spec.kind,
            spec.level.clone().unwrap_or(Level::ALL),
        ));
        self.created.lock().push(Arc::clone(&handler));
        Ok(handler)
    }
}

/// Error sink collecting `(logger, message)` pairs.
#[derive(Default)]
pub struct CollectingSink {
    reports: Mutex<Vec<(String, String)>>,
}

impl CollectingSink {
    pub fn reports(&self) -> Vec<(String, String)> {
        self.reports.lock().clone()
    }
}

impl ErrorSink for CollectingSink {
    fn report(&self, logger: &str, error: &HandlerError) {
        self.reports.lock().push((logger.to_string(), error.to_string()));
    }
}

/// Settings with no initial configuration.
pub fn quiet_settings() -> RegistrySettings {
    RegistrySettings {
        initial: ConfigurationSnapshot::new(),
        ..RegistrySettings::default()
    }
}

pub struct Harness {
    pub manager: LogManager,
    pub factory: Arc<CountingFactory>,
    pub sink: Arc<CollectingSink>,
}

/// Manager wired to a counting factory and a collecting error sink.
pub fn harness() -> Harness {
    let factory = Arc::new(CountingFactory::default());
    let sink = Arc::new(CollectingSink::default());
    let manager = LogManager::with_parts(quiet_settings(), factory.clone(), sink.clone());
    Harness { manager, factory, sink }
}

/// Snapshot attaching handler `id` of `kind` to `logger`.
pub fn handler_snapshot(logger: &str, id: &str, kind: &str) -> ConfigurationSnapshot {
    ConfigurationSnapshot::new()
        .with_handlers(logger, [id])
        .with_handler(id, HandlerSpec::new(kind))
}

/// Background thread polling parking_lot's wait-for graph.
///
/// A detected cycle is printed and the process exits with a failure status,
/// since a deadlocked test would otherwise hang.
pub struct DeadlockWatchdog {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<usize>>,
}

impl DeadlockWatchdog {
    pub fn start() -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = thread::spawn(move || {
            let mut checks = 0;
            while !flag.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(50));
                checks += 1;
                let cycles = parking_lot::deadlock::check_deadlock();
                if cycles.is_empty() {
                    continue;
                }
                eprintln!("{} deadlock cycle(s) detected", cycles.len());
                for (i, threads) in cycles.iter().enumerate() {
                    for t in threads {
                        eprintln!("cycle {i}: thread {:?}\n{:?}", t.thread_id(), t.backtrace());
                    }
                }
                std::process::exit(101);
            }
            checks
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stop polling; returns the number of checks performed.
    pub fn finish(mut self) -> usize {
        self.stop.store(true, Ordering::SeqCst);
        self.handle.take().map_or(0, |h| h.join().unwrap_or(0))
    }
}

impl Drop for DeadlockWatchdog {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}
