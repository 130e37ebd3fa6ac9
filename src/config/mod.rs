//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) or flat properties
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ConfigurationSnapshot (validated, immutable)
//!     → store.rs apply (merge, swap, reconfigure live loggers)
//!     → listeners.rs (notified after the pass, outside locks)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new snapshot
//!     → apply_updates feeds it to the store
//! ```
//!
//! # Design Decisions
//! - Snapshots are immutable once built; changes go through a full apply
//! - Every directive is optional; an empty snapshot configures nothing
//! - Validation separates syntactic (serde) from semantic checks

pub mod listeners;
pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;
pub mod watcher;

pub use listeners::{ConfigurationListener, ConfigurationListenerSet};
pub use loader::{load_config, parse_properties, parse_properties_str, ConfigError};
pub use schema::{ConfigKey, ConfigValue, ConfigurationSnapshot, HandlerSpec, LoggerDirective, MergePolicy};
pub use store::ConfigurationStore;
pub use watcher::ConfigWatcher;
