//! Metrics collection.
//!
//! # Metrics
//! - `logtree_records_published_total` (counter): successful handler deliveries
//! - `logtree_handler_failures_total` (counter): handler errors and panics
//! - `logtree_loggers_created_total` (counter): loggers added to a registry
//! - `logtree_loggers_reclaimed_total` (counter): dead entries swept
//! - `logtree_configuration_applied_total` (counter): successful apply passes
//! - `logtree_listener_failures_total` (counter): failing listener invocations
//! - `logtree_live_loggers` (gauge): names with a live node after a sweep
//!
//! # Design Decisions
//! - Facade only; no recorder is installed by the library
//! - Updates are cheap when no recorder is present

use metrics::{counter, gauge};

pub fn record_published() {
    counter!("logtree_records_published_total").increment(1);
}

pub fn record_handler_failure() {
    counter!("logtree_handler_failures_total").increment(1);
}

pub fn record_logger_created() {
    counter!("logtree_loggers_created_total").increment(1);
}

pub fn record_reclaimed(count: usize) {
    counter!("logtree_loggers_reclaimed_total").increment(count as u64);
}

pub fn record_configuration_applied() {
    counter!("logtree_configuration_applied_total").increment(1);
}

pub fn record_listener_failures(count: usize) {
    counter!("logtree_listener_failures_total").increment(count as u64);
}

pub fn record_live_loggers(count: usize) {
    gauge!("logtree_live_loggers").set(count as f64);
}
