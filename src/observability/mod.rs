//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! registry / store / dispatcher produce:
//!     → tracing events (lifecycle, reloads, handler failures)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → logging.rs subscriber (stderr, filtered by RUST_LOG)
//!     → any `metrics` recorder the embedding application installs
//! ```

pub mod logging;
pub mod metrics;
