//! In-memory metrics backends
//!
//! Implements the metrics client ports without any network access. Each
//! source name maps to a fixture describing what its backend exposes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::crd::MetricsServiceBackend;
use crate::domain::ports::{MetricsClient, MetricsClientProvider, SourceDescriptor};
use crate::domain::{
    CustomMetricInfo, ExternalMetricInfo, ExternalMetricValue, ExternalMetricValueList,
    MetricIdentifier, MetricKind, MetricValue, MetricValueList, NamespacedName, ObjectReference,
};
use crate::error::{Error, Result};

/// Namespace every in-memory backend pretends to live in.
pub const FAKE_NAMESPACE: &str = "fakens";

const DEFAULT_VALUE: &str = "1";

#[derive(Debug, Clone, Default)]
struct BackendFixture {
    custom: HashSet<CustomMetricInfo>,
    external: HashSet<ExternalMetricInfo>,
    failing: HashSet<MetricKind>,
    value: Option<String>,
}

/// Builds [`InMemoryMetricsClient`]s from per-source fixtures.
///
/// A client captures its source's fixture when it is built, so changing
/// a fixture only affects the next `add_or_update_source`.
#[derive(Debug, Default)]
pub struct InMemoryClientProvider {
    fixtures: parking_lot::RwLock<HashMap<String, BackendFixture>>,
    clients_built: AtomicUsize,
}

impl InMemoryClientProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the custom metrics `source` exposes.
    pub fn expose_custom_metrics(
        &self,
        source: &str,
        metrics: impl IntoIterator<Item = CustomMetricInfo>,
    ) {
        self.fixtures.write().entry(source.to_string()).or_default().custom =
            metrics.into_iter().collect();
    }

    /// Replace the external metrics `source` exposes.
    pub fn expose_external_metrics(
        &self,
        source: &str,
        metrics: impl IntoIterator<Item = ExternalMetricInfo>,
    ) {
        self.fixtures.write().entry(source.to_string()).or_default().external =
            metrics.into_iter().collect();
    }

    /// Make discovery of `kind` fail for `source`.
    pub fn fail_discovery(&self, source: &str, kind: MetricKind) {
        self.fixtures
            .write()
            .entry(source.to_string())
            .or_default()
            .failing
            .insert(kind);
    }

    pub fn restore_discovery(&self, source: &str, kind: MetricKind) {
        if let Some(fixture) = self.fixtures.write().get_mut(source) {
            fixture.failing.remove(&kind);
        }
    }

    /// Quantity returned by every value fetch against `source`.
    pub fn set_value(&self, source: &str, value: &str) {
        self.fixtures.write().entry(source.to_string()).or_default().value =
            Some(value.to_string());
    }

    /// Number of clients handed out so far.
    pub fn clients_built(&self) -> usize {
        self.clients_built.load(Ordering::SeqCst)
    }
}

impl MetricsClientProvider for InMemoryClientProvider {
    fn new_client(&self, descriptor: &SourceDescriptor) -> Result<Arc<dyn MetricsClient>> {
        let fixture = self
            .fixtures
            .read()
            .get(&descriptor.name)
            .cloned()
            .unwrap_or_default();
        self.clients_built.fetch_add(1, Ordering::SeqCst);

        Ok(Arc::new(InMemoryMetricsClient {
            backend: MetricsServiceBackend::new(FAKE_NAMESPACE, &descriptor.name),
            fixture,
        }))
    }
}

/// Metrics client answering from a fixture.
#[derive(Debug, Clone)]
pub struct InMemoryMetricsClient {
    backend: MetricsServiceBackend,
    fixture: BackendFixture,
}

impl InMemoryMetricsClient {
    fn check_discovery(&self, kind: MetricKind) -> Result<()> {
        if self.fixture.failing.contains(&kind) {
            return Err(Error::BackendStatus {
                url: self.backend.url(),
                status: 503,
            });
        }
        Ok(())
    }

    fn unknown_metric(&self) -> Error {
        Error::BackendStatus {
            url: self.backend.url(),
            status: 404,
        }
    }

    fn value(&self) -> Quantity {
        Quantity(
            self.fixture
                .value
                .clone()
                .unwrap_or_else(|| DEFAULT_VALUE.to_string()),
        )
    }

    fn custom_value(
        &self,
        namespace: &str,
        name: Option<&str>,
        info: &CustomMetricInfo,
    ) -> MetricValue {
        MetricValue {
            described_object: ObjectReference {
                kind: Some(info.group_resource.resource.clone()),
                namespace: (!namespace.is_empty()).then(|| namespace.to_string()),
                name: name.map(str::to_string),
                ..Default::default()
            },
            metric: MetricIdentifier {
                name: info.metric.clone(),
                selector: None,
            },
            timestamp: Utc::now(),
            window_seconds: Some(60),
            value: self.value(),
        }
    }
}

#[async_trait]
impl MetricsClient for InMemoryMetricsClient {
    async fn list_custom_metric_infos(&self) -> Result<HashSet<CustomMetricInfo>> {
        self.check_discovery(MetricKind::Custom)?;
        Ok(self.fixture.custom.clone())
    }

    async fn list_external_metric_infos(&self) -> Result<HashSet<ExternalMetricInfo>> {
        self.check_discovery(MetricKind::External)?;
        Ok(self.fixture.external.clone())
    }

    async fn get_metric_by_name(
        &self,
        name: &NamespacedName,
        info: &CustomMetricInfo,
        _metric_selector: Option<&str>,
    ) -> Result<MetricValue> {
        if !self.fixture.custom.contains(info) {
            return Err(self.unknown_metric());
        }
        Ok(self.custom_value(&name.namespace, Some(&name.name), info))
    }

    async fn get_metric_by_selector(
        &self,
        namespace: &str,
        _selector: Option<&str>,
        info: &CustomMetricInfo,
        _metric_selector: Option<&str>,
    ) -> Result<MetricValueList> {
        if !self.fixture.custom.contains(info) {
            return Err(self.unknown_metric());
        }
        Ok(MetricValueList {
            items: vec![self.custom_value(namespace, None, info)],
        })
    }

    async fn get_external_metric(
        &self,
        _namespace: &str,
        info: &ExternalMetricInfo,
        _metric_selector: Option<&str>,
    ) -> Result<ExternalMetricValueList> {
        if !self.fixture.external.contains(info) {
            return Err(self.unknown_metric());
        }
        Ok(ExternalMetricValueList {
            items: vec![ExternalMetricValue {
                metric_name: info.metric.clone(),
                metric_labels: Default::default(),
                timestamp: Utc::now(),
                window_seconds: Some(60),
                value: self.value(),
            }],
        })
    }

    fn backend(&self) -> &MetricsServiceBackend {
        &self.backend
    }
}
