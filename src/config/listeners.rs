//! Configuration-change listeners.
//!
//! Listeners run after a configuration pass completes, outside every registry
//! and store lock, in registration order. A listener that fails or panics does
//! not stop the rest; the first failure becomes the primary error and the
//! others are attached as suppressed.

use std::error::Error as StdError;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{panic_message, ListenerError, ListenerFailure, RegistryError, RegistryResult};
use crate::observability::metrics;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Callback invoked after each successful configuration apply.
pub trait ConfigurationListener: Send + Sync {
    fn on_configuration_applied(&self) -> Result<(), BoxError>;
}

impl<F> ConfigurationListener for F
where
    F: Fn() -> Result<(), BoxError> + Send + Sync,
{
    fn on_configuration_applied(&self) -> Result<(), BoxError> {
        self()
    }
}

/// Ordered listener list. The same listener may be registered more than once
/// and is then invoked once per registration.
#[derive(Default)]
pub struct ConfigurationListenerSet {
    listeners: Mutex<Vec<Arc<dyn ConfigurationListener>>>,
}

fn same_listener(a: &Arc<dyn ConfigurationListener>, b: &Arc<dyn ConfigurationListener>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl ConfigurationListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Option<Arc<dyn ConfigurationListener>>) -> RegistryResult<()> {
        let listener = listener.ok_or(RegistryError::NullArgument("listener"))?;
        self.listeners.lock().push(listener);
        Ok(())
    }

    /// Remove one registration of `listener`. Removing a listener that is not
    /// registered is a no-op.
    pub fn remove(&self, listener: Option<&Arc<dyn ConfigurationListener>>) -> RegistryResult<()> {
        let listener = listener.ok_or(RegistryError::NullArgument("listener"))?;
        let removed = {
            let mut listeners = self.listeners.lock();
            listeners
                .iter()
                .position(|l| same_listener(l, listener))
                .map(|pos| listeners.remove(pos))
        };
        drop(removed);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Invoke every registered listener on a snapshot of the list.
    pub fn fire_all(&self) -> Result<(), ListenerError> {
        let snapshot: Vec<Arc<dyn ConfigurationListener>> = self.listeners.lock().clone();

        let mut failures = Vec::new();
        for listener in &snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener.on_configuration_applied())) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => failures.push(ListenerFailure::Failed(e)),
                Err(payload) => failures.push(ListenerFailure::Panicked(panic_message(&*payload))),
            }
        }

        if failures.is_empty() {
            return Ok(());
        }
        metrics::record_listener_failures(failures.len());
        tracing::warn!(failed = failures.len(), total = snapshot.len(), "Configuration listeners failed");

        let mut failures = failures.into_iter();
        match failures.next() {
            Some(primary) => Err(ListenerError {
                primary,
                suppressed: failures.collect(),
            }),
            None => Ok(()),
        }
    }
}
