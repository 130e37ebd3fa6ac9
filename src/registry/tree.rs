//! Dotted-name trie used to find parents and children at registration time.
//!
//! Every segment of every registered name gets a trie node, whether or not a
//! logger exists at that exact name. Entries hold weak references only.
//! Empty branches are pruned when their last entry is cleared.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::logger::LoggerNode;

#[derive(Clone)]
pub(crate) struct Entry {
    pub(crate) id: u64,
    pub(crate) node: Weak<LoggerNode>,
}

#[derive(Default)]
struct TrieNode {
    children: HashMap<String, TrieNode>,
    entry: Option<Entry>,
}

impl TrieNode {
    fn is_empty(&self) -> bool {
        self.entry.is_none() && self.children.is_empty()
    }

    /// Nearest live entries below this node: a live child stops the descent.
    fn collect_boundary(&self, out: &mut Vec<Arc<LoggerNode>>) {
        for child in self.children.values() {
            match child.entry.as_ref().and_then(|e| e.node.upgrade()) {
                Some(live) => out.push(live),
                None => child.collect_boundary(out),
            }
        }
    }

    /// Returns true if this node became empty and can be removed.
    fn clear(&mut self, segments: &[&str], id: u64) -> bool {
        match segments.split_first() {
            None => {
                if self.entry.as_ref().is_some_and(|e| e.id == id) {
                    self.entry = None;
                }
            }
            Some((head, rest)) => {
                let prune = match self.children.get_mut(*head) {
                    Some(child) => child.clear(rest, id),
                    None => false,
                };
                if prune {
                    self.children.remove(*head);
                }
            }
        }
        self.is_empty()
    }
}

fn segments(name: &str) -> Vec<&str> {
    if name.is_empty() {
        Vec::new()
    } else {
        name.split('.').collect()
    }
}

#[derive(Default)]
pub(crate) struct NameTree {
    root: TrieNode,
}

impl NameTree {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_entry(&mut self, name: &str, entry: Entry) {
        let mut node = &mut self.root;
        for seg in segments(name) {
            node = node.children.entry(seg.to_string()).or_default();
        }
        node.entry = Some(entry);
    }

    /// Clear the entry at `name` if it still belongs to node `id`.
    pub(crate) fn clear_entry(&mut self, name: &str, id: u64) {
        let segs = segments(name);
        self.root.clear(&segs, id);
    }

    /// Nearest live proper ancestor of `name`.
    ///
    /// Every live entry upgraded along the way is pushed onto `held`, so the
    /// caller controls where those references are dropped.
    pub(crate) fn nearest_live_ancestor(
        &self,
        name: &str,
        held: &mut Vec<Arc<LoggerNode>>,
    ) -> Option<Arc<LoggerNode>> {
        let segs = segments(name);
        let Some((_, ancestors)) = segs.split_last() else {
            return None;
        };

        let mut best = self.root.entry.as_ref().and_then(|e| e.node.upgrade());
        let mut node = &self.root;
        for seg in ancestors {
            match node.children.get(*seg) {
                Some(child) => node = child,
                None => break,
            }
            if let Some(live) = node.entry.as_ref().and_then(|e| e.node.upgrade()) {
                if let Some(prev) = best.replace(live) {
                    held.push(prev);
                }
            }
        }
        best
    }

    /// Nearest live descendants of `name`, i.e. the loggers that should
    /// become its direct children.
    pub(crate) fn child_boundary(&self, name: &str) -> Vec<Arc<LoggerNode>> {
        let mut node = &self.root;
        for seg in segments(name) {
            match node.children.get(seg) {
                Some(child) => node = child,
                None => return Vec::new(),
            }
        }
        let mut out = Vec::new();
        node.collect_boundary(&mut out);
        out
    }

    #[cfg(test)]
    fn contains_path(&self, name: &str) -> bool {
        let mut node = &self.root;
        for seg in segments(name) {
            match node.children.get(seg) {
                Some(child) => node = child,
                None => return false,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::Logger;

    fn entry(logger: &Logger) -> Entry {
        Entry {
            id: logger.node.id,
            node: logger.downgrade(),
        }
    }

    #[test]
    fn test_nearest_live_ancestor_skips_gaps() {
        let root = Logger::new("").unwrap();
        let a = Logger::new("a").unwrap();
        let mut tree = NameTree::new();
        tree.set_entry("", entry(&root));
        tree.set_entry("a", entry(&a));

        let mut held = Vec::new();
        let found = tree.nearest_live_ancestor("a.b.c", &mut held).unwrap();
        assert!(Arc::ptr_eq(&found, &a.node));
        assert_eq!(held.len(), 1);

        let mut held = Vec::new();
        let found = tree.nearest_live_ancestor("z", &mut held).unwrap();
        assert!(Arc::ptr_eq(&found, &root.node));
        assert!(tree.nearest_live_ancestor("", &mut held).is_none());
    }

    #[test]
    fn test_child_boundary_stops_at_live_nodes() {
        let ab = Logger::new("a.b").unwrap();
        let abcd = Logger::new("a.b.c.d").unwrap();
        let ax = Logger::new("a.x.y").unwrap();
        let mut tree = NameTree::new();
        for l in [&ab, &abcd, &ax] {
            tree.set_entry(l.name(), entry(l));
        }

        let mut names: Vec<String> = tree
            .child_boundary("a")
            .iter()
            .map(|n| Logger { node: n.clone() }.name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.b", "a.x.y"]);
        assert!(tree.child_boundary("q").is_empty());
    }

    #[test]
    fn test_clear_entry_checks_id_and_prunes() {
        let old = Logger::new("p.q").unwrap();
        let new = Logger::new("p.q").unwrap();
        let mut tree = NameTree::new();
        tree.set_entry("p.q", entry(&new));

        tree.clear_entry("p.q", old.node.id);
        assert_eq!(tree.child_boundary("p").len(), 1);

        tree.clear_entry("p.q", new.node.id);
        assert!(!tree.contains_path("p"));
    }
}
