//! Severity levels.
//!
//! # Responsibilities
//! - Define the standard level set (OFF .. ALL) with integer ranks
//! - Resolve level names or numeric ranks through a `LevelTable`
//! - Order levels by rank; rank comparison is the only loggability test

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A named severity with an integer rank.
///
/// Equality, ordering and hashing look at the rank only, so two levels with
/// different names but the same rank are interchangeable.
#[derive(Debug, Clone)]
pub struct Level {
    name: Cow<'static, str>,
    rank: i32,
}

impl Level {
    /// Nothing is loggable.
    pub const OFF: Level = Level::builtin("OFF", i32::MAX);
    pub const SEVERE: Level = Level::builtin("SEVERE", 1000);
    pub const WARNING: Level = Level::builtin("WARNING", 900);
    pub const INFO: Level = Level::builtin("INFO", 800);
    pub const CONFIG: Level = Level::builtin("CONFIG", 700);
    pub const FINE: Level = Level::builtin("FINE", 500);
    pub const FINER: Level = Level::builtin("FINER", 400);
    pub const FINEST: Level = Level::builtin("FINEST", 300);
    /// Everything is loggable.
    pub const ALL: Level = Level::builtin("ALL", i32::MIN);

    const fn builtin(name: &'static str, rank: i32) -> Self {
        Self {
            name: Cow::Borrowed(name),
            rank,
        }
    }

    /// Create a custom level.
    pub fn new(name: impl Into<String>, rank: i32) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            rank,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rank(&self) -> i32 {
        self.rank
    }

    /// True if a record at `record_level` passes a threshold of `self`.
    ///
    /// `OFF` as a threshold rejects everything, including `OFF` records.
    pub fn admits(&self, record_level: &Level) -> bool {
        self.rank != i32::MAX && record_level.rank >= self.rank
    }
}

impl PartialEq for Level {
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank
    }
}

impl Eq for Level {}

impl PartialOrd for Level {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Level {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank.cmp(&other.rank)
    }
}

impl Hash for Level {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank.hash(state);
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Ordered set of known levels.
#[derive(Debug, Clone)]
pub struct LevelTable {
    /// Sorted by rank, highest first.
    levels: Vec<Level>,
}

impl LevelTable {
    /// The nine standard levels.
    pub fn standard() -> Self {
        Self {
            levels: vec![
                Level::OFF,
                Level::SEVERE,
                Level::WARNING,
                Level::INFO,
                Level::CONFIG,
                Level::FINE,
                Level::FINER,
                Level::FINEST,
                Level::ALL,
            ],
        }
    }

    /// Add a custom level. A level with the same name replaces the old entry.
    pub fn register(&mut self, level: Level) {
        self.levels.retain(|l| l.name() != level.name());
        let pos = self
            .levels
            .iter()
            .position(|l| l.rank() < level.rank())
            .unwrap_or(self.levels.len());
        self.levels.insert(pos, level);
    }

    /// Resolve a level by exact name, or by integer rank.
    ///
    /// A numeric value that matches no known level yields an anonymous level
    /// carrying that rank.
    pub fn find(&self, value: &str) -> Option<Level> {
        let value = value.trim();
        if let Some(level) = self.levels.iter().find(|l| l.name() == value) {
            return Some(level.clone());
        }
        let rank: i32 = value.parse().ok()?;
        Some(
            self.levels
                .iter()
                .find(|l| l.rank() == rank)
                .cloned()
                .unwrap_or_else(|| Level::new(value, rank)),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &Level> {
        self.levels.iter()
    }
}

impl Default for LevelTable {
    fn default() -> Self {
        Self::standard()
    }
}
