//! Domain Ports (Port/Adapter Pattern)
//!
//! The registry only sees metrics backends through these traits. The HTTP
//! adapter talks to real backends; the in-memory adapter backs tests.
//!
//! ```text
//! ┌──────────────────────┐  new_client()   ┌──────────────────────┐
//! │ MetricsClientProvider│────────────────▶│    MetricsClient     │
//! └──────────────────────┘                 │  discovery + fetch   │
//!                                          └──────────────────────┘
//! ```

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use super::metrics::{
    CustomMetricInfo, ExternalMetricInfo, ExternalMetricValueList, MetricKind, MetricValue,
    MetricValueList, NamespacedName,
};
use crate::crd::MetricsServiceBackend;
use crate::error::Result;

// =============================================================================
// Value Objects
// =============================================================================

/// Everything the registry needs to know about a source to (re)register it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    /// Unique source name
    pub name: String,
    /// Higher priority wins
    pub priority: i32,
    /// Skip TLS verification when talking to the backend
    pub insecure_skip_tls_verify: bool,
    /// Where the backend is reachable
    pub backend: MetricsServiceBackend,
    /// Metric kinds to discover
    pub metric_kinds: Vec<MetricKind>,
}

impl SourceDescriptor {
    pub fn new(name: impl Into<String>, priority: i32, backend: MetricsServiceBackend) -> Self {
        Self {
            name: name.into(),
            priority,
            insecure_skip_tls_verify: false,
            backend,
            metric_kinds: Vec::new(),
        }
    }

    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = MetricKind>) -> Self {
        self.metric_kinds = kinds.into_iter().collect();
        self
    }

    /// Whether discovery should run for `kind`
    pub fn serves(&self, kind: MetricKind) -> bool {
        self.metric_kinds.contains(&kind)
    }
}

// =============================================================================
// Metrics Client Port
// =============================================================================

/// Capability to discover and fetch metrics from one backend.
///
/// The registry calls the discovery operations; the value operations are
/// only invoked by the serving façade on a resolved client.
#[async_trait]
pub trait MetricsClient: Send + Sync + Debug {
    /// Custom metrics the backend currently exposes.
    ///
    /// Malformed entries are skipped, they do not fail the listing.
    async fn list_custom_metric_infos(&self) -> Result<HashSet<CustomMetricInfo>>;

    /// External metrics the backend currently exposes.
    async fn list_external_metric_infos(&self) -> Result<HashSet<ExternalMetricInfo>>;

    /// Value of a custom metric for a single object.
    async fn get_metric_by_name(
        &self,
        name: &NamespacedName,
        info: &CustomMetricInfo,
        metric_selector: Option<&str>,
    ) -> Result<MetricValue>;

    /// Values of a custom metric for all objects matching `selector`.
    async fn get_metric_by_selector(
        &self,
        namespace: &str,
        selector: Option<&str>,
        info: &CustomMetricInfo,
        metric_selector: Option<&str>,
    ) -> Result<MetricValueList>;

    /// Values of an external metric.
    async fn get_external_metric(
        &self,
        namespace: &str,
        info: &ExternalMetricInfo,
        metric_selector: Option<&str>,
    ) -> Result<ExternalMetricValueList>;

    /// Backend this client talks to.
    fn backend(&self) -> &MetricsServiceBackend;
}

/// Builds a fresh [`MetricsClient`] for a source.
pub trait MetricsClientProvider: Send + Sync {
    fn new_client(&self, descriptor: &SourceDescriptor) -> Result<Arc<dyn MetricsClient>>;
}
