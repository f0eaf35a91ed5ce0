//! Ranking list of the sources exposing one metric

use std::cmp::Ordering;

/// Reference to a source inside a ranking list.
///
/// Sources are referenced by name; the priority is carried along as the
/// sort key. The client handle stays in the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub name: String,
    pub priority: i32,
}

impl SourceRef {
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        Self {
            name: name.into(),
            priority,
        }
    }
}

/// Canonical order: priority descending, then name ascending.
pub fn canonical_order(a: &SourceRef, b: &SourceRef) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.name.cmp(&b.name))
}

/// Sources exposing one metric identifier, kept in canonical order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankingList {
    sources: Vec<SourceRef>,
}

impl RankingList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `source`, or replace the entry with the same name, then re-sort.
    pub fn upsert(&mut self, source: SourceRef) {
        match self.sources.iter_mut().find(|s| s.name == source.name) {
            Some(existing) => *existing = source,
            None => self.sources.push(source),
        }
        self.sources.sort_by(canonical_order);
    }

    /// Remove the entry named `name`. Returns whether the list is now empty.
    pub fn remove(&mut self, name: &str) -> bool {
        if let Some(pos) = self.sources.iter().position(|s| s.name == name) {
            self.sources.remove(pos);
            self.sources.sort_by(canonical_order);
        }
        self.sources.is_empty()
    }

    /// Highest ranked source, if any.
    pub fn select_best(&self) -> Option<&SourceRef> {
        self.sources.first()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.iter().any(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceRef> {
        self.sources.iter()
    }

    /// Source names in rank order.
    pub fn names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name.clone()).collect()
    }
}
