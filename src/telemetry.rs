//! Prometheus collectors for the router
//!
//! Collectors live in their own `prometheus::Registry` so several routers
//! (or tests) can coexist in one process.

use std::sync::Arc;

use prometheus::{
    Encoder, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry as PromRegistry, TextEncoder,
};

use crate::domain::MetricKind;
use crate::error::Result;

const NAMESPACE: &str = "metrics_router";

/// Collectors describing registry and reconciliation activity.
pub struct RouterMetrics {
    registry: PromRegistry,
    registered_sources: IntGauge,
    indexed_metrics: IntGaugeVec,
    resolutions: IntCounterVec,
    discovery_failures: IntCounterVec,
    reconciliations: IntCounterVec,
}

impl RouterMetrics {
    /// Create and register all collectors.
    pub fn new() -> Result<Arc<Self>> {
        let registry = PromRegistry::new();

        let registered_sources = IntGauge::with_opts(
            Opts::new("registered_sources", "Number of registered metrics sources")
                .namespace(NAMESPACE),
        )?;
        let indexed_metrics = IntGaugeVec::new(
            Opts::new("indexed_metrics", "Number of metrics served by at least one source")
                .namespace(NAMESPACE),
            &["kind"],
        )?;
        let resolutions = IntCounterVec::new(
            Opts::new("resolutions_total", "Metric to backend resolutions")
                .namespace(NAMESPACE),
            &["kind", "result"],
        )?;
        let discovery_failures = IntCounterVec::new(
            Opts::new("discovery_failures_total", "Failed metric discoveries")
                .namespace(NAMESPACE),
            &["kind"],
        )?;
        let reconciliations = IntCounterVec::new(
            Opts::new("reconciliations_total", "MetricsSource reconciliations")
                .namespace(NAMESPACE),
            &["result"],
        )?;

        registry.register(Box::new(registered_sources.clone()))?;
        registry.register(Box::new(indexed_metrics.clone()))?;
        registry.register(Box::new(resolutions.clone()))?;
        registry.register(Box::new(discovery_failures.clone()))?;
        registry.register(Box::new(reconciliations.clone()))?;

        Ok(Arc::new(Self {
            registry,
            registered_sources,
            indexed_metrics,
            resolutions,
            discovery_failures,
            reconciliations,
        }))
    }

    pub fn set_registry_size(&self, sources: usize, custom: usize, external: usize) {
        self.registered_sources.set(sources as i64);
        self.indexed_metrics
            .with_label_values(&[&MetricKind::Custom.to_string()])
            .set(custom as i64);
        self.indexed_metrics
            .with_label_values(&[&MetricKind::External.to_string()])
            .set(external as i64);
    }

    pub fn record_resolution(&self, kind: MetricKind, result: &str) {
        self.resolutions
            .with_label_values(&[&kind.to_string(), result])
            .inc();
    }

    pub fn record_discovery_failure(&self, kind: MetricKind) {
        self.discovery_failures
            .with_label_values(&[&kind.to_string()])
            .inc();
    }

    pub fn record_reconcile(&self, success: bool) {
        let result = if success { "success" } else { "error" };
        self.reconciliations.with_label_values(&[result]).inc();
    }

    /// Text exposition of all collectors, with its content type.
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

impl std::fmt::Debug for RouterMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterMetrics")
            .field("registered_sources", &self.registered_sources.get())
            .finish()
    }
}
