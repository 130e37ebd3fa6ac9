//! Hierarchical logger registry and dispatch core.
//!
//! # Architecture Overview
//!
//! ```text
//!   get_logger("a.b.c")                  apply(snapshot)
//!          │                                   │
//!          ▼                                   ▼
//!   ┌─────────────┐   configure node   ┌──────────────────┐   fire   ┌───────────┐
//!   │  registry   │◀───────────────────│ config store     │─────────▶│ listeners │
//!   │ names+tree  │                    │ merge/swap/reset │          └───────────┘
//!   └──────┬──────┘                    └──────────────────┘
//!          │ links
//!          ▼
//!   ┌─────────────┐  publish   ┌────────────┐   errors   ┌────────────┐
//!   │ logger tree │───────────▶│ dispatcher │───────────▶│ error sink │
//!   │ levels/kids │            │ + handlers │            └────────────┘
//!   └─────────────┘            └────────────┘
//! ```

// Core
pub mod dispatch;
pub mod level;
pub mod logger;
pub mod record;
pub mod registry;

// Sinks and configuration
pub mod config;
pub mod handler;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod observability;

pub use config::{ConfigurationListener, ConfigurationSnapshot, ConfigurationStore, MergePolicy};
pub use dispatch::{Dispatcher, ErrorSink, TracingErrorSink};
pub use error::{HandlerError, ListenerError, ListenerFailure, RegistryError, RegistryResult};
pub use handler::{Handler, HandlerFactory};
pub use level::{Level, LevelTable};
pub use lifecycle::Shutdown;
pub use logger::Logger;
pub use manager::LogManager;
pub use record::LogRecord;
pub use registry::{Registry, RegistrySettings};
