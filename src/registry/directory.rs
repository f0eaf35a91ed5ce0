//! Source directory: source name to source record

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::domain::{CustomMetricInfo, ExternalMetricInfo, MetricsClient};

use super::ranking::SourceRef;

/// Canonical state of one registered source.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub name: String,
    pub priority: i32,
    pub custom_metrics: HashSet<CustomMetricInfo>,
    pub external_metrics: HashSet<ExternalMetricInfo>,
    pub client: Arc<dyn MetricsClient>,
}

impl SourceRecord {
    /// Reference used in ranking lists.
    pub fn source_ref(&self) -> SourceRef {
        SourceRef::new(&self.name, self.priority)
    }

    /// Number of served identifiers, both kinds.
    pub fn metric_count(&self) -> usize {
        self.custom_metrics.len() + self.external_metrics.len()
    }
}

/// Registered sources by name.
#[derive(Debug, Default)]
pub struct SourceDirectory {
    sources: HashMap<String, SourceRecord>,
}

impl SourceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&SourceRecord> {
        self.sources.get(name)
    }

    /// Insert `record`, returning the record it replaced.
    pub fn insert(&mut self, record: SourceRecord) -> Option<SourceRecord> {
        self.sources.insert(record.name.clone(), record)
    }

    pub fn remove(&mut self, name: &str) -> Option<SourceRecord> {
        self.sources.remove(name)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }
}
