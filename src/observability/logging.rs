//! Diagnostic logging for the library itself.
//!
//! # Responsibilities
//! - Initialize the `tracing` subscriber for binaries and tests
//! - Read the filter from `RUST_LOG`, falling back to a default directive
//!
//! # Design Decisions
//! - The library only emits `tracing` events; installing a subscriber is the
//!   binary's call
//! - `try_init` so repeated initialization (tests) is harmless

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "logtree=info";

/// Install a `fmt` subscriber filtered by `RUST_LOG` or `default_filter`.
/// Returns false if a global subscriber was already set.
pub fn init(default_filter: &str) -> bool {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .is_ok()
}
