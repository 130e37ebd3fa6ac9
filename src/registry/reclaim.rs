//! Queue of reclaimed logger nodes awaiting removal from the name table.
//!
//! Nodes push themselves here from `Drop`, on whatever thread released the
//! last reference. The queue mutex is a leaf lock: nothing else is acquired
//! while it is held, and nothing dropped under it can run a node destructor.

use std::collections::VecDeque;
use std::sync::Weak;

use parking_lot::Mutex;

use crate::logger::LoggerNode;

/// Everything needed to remove a dead node's registry entries.
pub(crate) struct Reclaimed {
    pub(crate) name: String,
    /// Guards against removing a newer node registered under the same name.
    pub(crate) id: u64,
    pub(crate) parent: Option<Weak<LoggerNode>>,
}

#[derive(Default)]
pub(crate) struct ReclaimQueue {
    items: Mutex<VecDeque<Reclaimed>>,
}

impl ReclaimQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, item: Reclaimed) {
        self.items.lock().push_back(item);
    }

    /// Take at most `max` entries, oldest first.
    pub(crate) fn drain(&self, max: usize) -> Vec<Reclaimed> {
        let mut items = self.items.lock();
        let n = max.min(items.len());
        items.drain(..n).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, id: u64) -> Reclaimed {
        Reclaimed {
            name: name.to_string(),
            id,
            parent: None,
        }
    }

    #[test]
    fn test_drain_is_bounded_and_ordered() {
        let q = ReclaimQueue::new();
        for i in 0..5 {
            q.push(item(&format!("n{i}"), i));
        }
        let first = q.drain(3);
        assert_eq!(first.iter().map(|r| r.id).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(q.len(), 2);
        assert_eq!(q.drain(10).len(), 2);
        assert!(q.drain(10).is_empty());
    }
}
