//! Metric Source Registry
//!
//! Tracks which registered source serves which metric, and which source wins
//! when several serve the same one.
//!
//! ```text
//! ┌───────────────────┐        ┌──────────────────────────────┐
//! │  SourceDirectory  │◀─name──│ MetricIndex<CustomMetricInfo>│
//! │ name → record     │        │ id → RankingList[name, prio] │
//! │ (owns the client) │◀─name──│ MetricIndex<ExternalMetric…> │
//! └───────────────────┘        └──────────────────────────────┘
//! ```
//!
//! All three maps sit behind one `RwLock`. Discovery runs before the
//! exclusive lock is taken, so a failing or slow backend never leaves a
//! partial update behind and never blocks resolution.

mod diff;
mod directory;
mod index;
mod ranking;
mod resolver;

pub use diff::removed_metrics;
pub use directory::{SourceDirectory, SourceRecord};
pub use index::MetricIndex;
pub use ranking::{canonical_order, RankingList, SourceRef};

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::domain::{
    CustomMetricInfo, ExternalMetricInfo, MetricInfo, MetricKind, MetricsClientProvider,
    SourceDescriptor,
};
use crate::error::{Error, Result};
use crate::telemetry::RouterMetrics;

/// Directory plus one index per metric kind.
#[derive(Debug, Default)]
struct RegistryState {
    directory: SourceDirectory,
    custom: MetricIndex<CustomMetricInfo>,
    external: MetricIndex<ExternalMetricInfo>,
}

impl RegistryState {
    /// Replace the record of `record.name`, moving its index references along.
    fn upsert(&mut self, record: SourceRecord) {
        let source = record.source_ref();
        let (previous_custom, previous_external) = self
            .directory
            .remove(&record.name)
            .map(|prev| (prev.custom_metrics, prev.external_metrics))
            .unwrap_or_default();

        self.custom
            .update(&source, &previous_custom, &record.custom_metrics);
        self.external
            .update(&source, &previous_external, &record.external_metrics);
        self.directory.insert(record);
    }

    fn remove(&mut self, name: &str) -> bool {
        self.custom.remove_source(name);
        self.external.remove_source(name);
        self.directory.remove(name).is_some()
    }
}

/// Registered state of one source, detached from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSnapshot {
    pub name: String,
    pub priority: i32,
    pub backend_url: String,
    pub custom_metrics: Vec<CustomMetricInfo>,
    pub external_metrics: Vec<ExternalMetricInfo>,
}

/// Deterministic copy of the whole registry, for comparisons.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub sources: BTreeMap<String, SourceSnapshot>,
    pub custom: BTreeMap<CustomMetricInfo, Vec<SourceRef>>,
    pub external: BTreeMap<ExternalMetricInfo, Vec<SourceRef>>,
}

/// Thread-safe registry shared by the controller and the serving façade.
pub struct Registry {
    client_provider: Arc<dyn MetricsClientProvider>,
    state: RwLock<RegistryState>,
    metrics: Option<Arc<RouterMetrics>>,
}

impl Registry {
    pub fn new(client_provider: Arc<dyn MetricsClientProvider>) -> Self {
        Self {
            client_provider,
            state: RwLock::new(RegistryState::default()),
            metrics: None,
        }
    }

    /// Report registry size and resolutions through `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<RouterMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Register `descriptor`, or refresh it if already registered.
    ///
    /// Builds a fresh client, discovers the metric kinds the descriptor
    /// asks for, and only then swaps the source's record. If any discovery
    /// fails nothing is changed. Returns the number of served metrics.
    #[instrument(
        skip(self, descriptor),
        fields(source = %descriptor.name, priority = descriptor.priority)
    )]
    pub async fn add_or_update_source(&self, descriptor: &SourceDescriptor) -> Result<usize> {
        let client = self.client_provider.new_client(descriptor)?;

        let custom_metrics = if descriptor.serves(MetricKind::Custom) {
            client
                .list_custom_metric_infos()
                .await
                .map_err(|e| self.discovery_failed(descriptor, MetricKind::Custom, e))?
        } else {
            HashSet::new()
        };

        let external_metrics = if descriptor.serves(MetricKind::External) {
            client
                .list_external_metric_infos()
                .await
                .map_err(|e| self.discovery_failed(descriptor, MetricKind::External, e))?
        } else {
            HashSet::new()
        };

        let record = SourceRecord {
            name: descriptor.name.clone(),
            priority: descriptor.priority,
            custom_metrics,
            external_metrics,
            client,
        };
        let custom_count = record.custom_metrics.len();
        let external_count = record.external_metrics.len();

        {
            let mut state = self.state.write();
            state.upsert(record);
            self.observe(&state);
        }

        info!(
            backend = %descriptor.backend.url(),
            custom_metrics = custom_count,
            external_metrics = external_count,
            "Metrics source registered"
        );
        Ok(custom_count + external_count)
    }

    /// Unregister `name`. Returns whether it was registered.
    #[instrument(skip(self))]
    pub fn delete_source(&self, name: &str) -> bool {
        let removed = {
            let mut state = self.state.write();
            let removed = state.remove(name);
            self.observe(&state);
            removed
        };

        if removed {
            info!("Metrics source removed");
        } else {
            debug!("Metrics source was not registered");
        }
        removed
    }

    /// Every custom metric served by at least one source.
    pub fn list_all_custom_metrics(&self) -> Vec<CustomMetricInfo> {
        self.state.read().custom.list_all()
    }

    /// Every external metric served by at least one source.
    pub fn list_all_external_metrics(&self) -> Vec<ExternalMetricInfo> {
        self.state.read().external.list_all()
    }

    /// Names of the sources serving `info`, best first.
    pub fn ranked_sources(&self, info: &MetricInfo) -> Vec<String> {
        let state = self.state.read();
        let list = match info {
            MetricInfo::Custom(custom) => state.custom.get(custom),
            MetricInfo::External(external) => state.external.get(external),
        };
        list.map(RankingList::names).unwrap_or_default()
    }

    pub fn describe_source(&self, name: &str) -> Option<SourceSnapshot> {
        self.state.read().directory.get(name).map(source_snapshot)
    }

    pub fn source_names(&self) -> Vec<String> {
        let mut names = self.state.read().directory.names();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.state.read().directory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().directory.is_empty()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.state.read();
        let sources = state
            .directory
            .names()
            .into_iter()
            .filter_map(|name| state.directory.get(&name).map(|r| (name, source_snapshot(r))))
            .collect();
        let custom = state
            .custom
            .iter()
            .map(|(info, list)| (info.clone(), list.iter().cloned().collect()))
            .collect();
        let external = state
            .external
            .iter()
            .map(|(info, list)| (info.clone(), list.iter().cloned().collect()))
            .collect();

        RegistrySnapshot {
            sources,
            custom,
            external,
        }
    }

    fn discovery_failed(&self, descriptor: &SourceDescriptor, kind: MetricKind, e: Error) -> Error {
        warn!(
            backend = %descriptor.backend.url(),
            kind = %kind,
            error = %e,
            "Metric discovery failed, keeping previous registration"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_discovery_failure(kind);
        }
        Error::Discovery {
            source_name: descriptor.name.clone(),
            kind,
            source: Box::new(e),
        }
    }

    fn observe(&self, state: &RegistryState) {
        if let Some(metrics) = &self.metrics {
            metrics.set_registry_size(
                state.directory.len(),
                state.custom.len(),
                state.external.len(),
            );
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Registry")
            .field("sources", &state.directory.len())
            .field("custom_metrics", &state.custom.len())
            .field("external_metrics", &state.external.len())
            .finish()
    }
}

fn source_snapshot(record: &SourceRecord) -> SourceSnapshot {
    let mut custom_metrics: Vec<CustomMetricInfo> = record.custom_metrics.iter().cloned().collect();
    custom_metrics.sort();
    let mut external_metrics: Vec<ExternalMetricInfo> =
        record.external_metrics.iter().cloned().collect();
    external_metrics.sort();

    SourceSnapshot {
        name: record.name.clone(),
        priority: record.priority,
        backend_url: record.client.backend().url(),
        custom_metrics,
        external_metrics,
    }
}
