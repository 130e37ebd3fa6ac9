//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     ctrl-c / caller → trigger() → background tasks (config updater) exit
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
