//! MetricsSource Custom Resource Definition
//!
//! Declares a backend service exposing custom and/or external metrics,
//! and the priority it takes over other backends exposing the same metric.

use chrono::{DateTime, Utc};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::domain::{MetricKind, SourceDescriptor};
use crate::error::Error;

/// Port used when a MetricsSource does not declare one.
pub const DEFAULT_BACKEND_PORT: i32 = 443;

// =============================================================================
// MetricsSource CRD
// =============================================================================

/// MetricsSource registers a metrics backend with the router.
///
/// When a MetricsSource is applied, the router will:
/// 1. Discover the metrics the backend service currently exposes
/// 2. Index them, ranked by priority against other sources
/// 3. Report the number of served metrics in the status
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metricsrouter.io",
    version = "v1alpha1",
    kind = "MetricsSource",
    plural = "metricssources",
    shortname = "ms",
    status = "MetricsSourceStatus",
    printcolumn = r#"{"name": "Service", "type": "string", "jsonPath": ".status.service"}"#,
    printcolumn = r#"{"name": "Port", "type": "integer", "jsonPath": ".status.port"}"#,
    printcolumn = r#"{"name": "Synced", "type": "boolean", "jsonPath": ".status.synced"}"#,
    printcolumn = r#"{"name": "Metrics", "type": "integer", "jsonPath": ".status.metricsCount"}"#,
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSourceSpec {
    /// Kubernetes service serving the metrics APIs.
    #[serde(default, rename = "service")]
    pub metrics_service_backend: MetricsServiceBackend,

    /// Skip TLS certificate verification when talking to the backend.
    #[serde(default, rename = "insecureSkipTLSVerify")]
    pub insecure_skip_tls_verify: bool,

    /// Sources with a higher priority win when several serve the same metric.
    pub priority: i32,

    /// Metric APIs to discover on the backend.
    #[serde(default)]
    pub metric_types: Vec<MetricType>,
}

/// Metric API served by a backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum MetricType {
    CustomMetrics,
    ExternalMetrics,
}

impl From<MetricType> for MetricKind {
    fn from(t: MetricType) -> Self {
        match t {
            MetricType::CustomMetrics => MetricKind::Custom,
            MetricType::ExternalMetrics => MetricKind::External,
        }
    }
}

// =============================================================================
// Service Backend
// =============================================================================

/// URI scheme used to reach a backend.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum UriScheme {
    Http,
    #[default]
    Https,
}

impl std::fmt::Display for UriScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UriScheme::Http => write!(f, "http"),
            UriScheme::Https => write!(f, "https"),
        }
    }
}

/// Port of the backend service
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ServiceBackendPort {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<i32>,
}

impl ServiceBackendPort {
    pub fn port(&self) -> i32 {
        self.number.unwrap_or(DEFAULT_BACKEND_PORT)
    }
}

/// Service the metrics are fetched from
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct MetricsServiceBackend {
    #[serde(default)]
    pub namespace: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<UriScheme>,

    #[serde(default)]
    pub port: ServiceBackendPort,
}

impl MetricsServiceBackend {
    /// Create a backend reference using the default scheme and port.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_port(mut self, port: i32) -> Self {
        self.port.number = Some(port);
        self
    }

    pub fn with_scheme(mut self, scheme: UriScheme) -> Self {
        self.scheme = Some(scheme);
        self
    }

    pub fn scheme(&self) -> UriScheme {
        self.scheme.unwrap_or_default()
    }

    /// `namespace/name` of the backing service
    pub fn namespaced_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// In-cluster URL of the backing service
    pub fn url(&self) -> String {
        format!(
            "{}://{}.{}.svc:{}",
            self.scheme(),
            self.name,
            self.namespace,
            self.port.port()
        )
    }
}

// =============================================================================
// Status
// =============================================================================

/// Observed state of the MetricsSource
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSourceStatus {
    /// Whether the last discovery succeeded
    #[serde(default)]
    pub synced: bool,

    /// Number of custom and external metrics served by the source
    #[serde(default)]
    pub metrics_count: u64,

    /// `namespace/name` of the backing service
    #[serde(default)]
    pub service: String,

    /// Port of the backing service
    #[serde(default)]
    pub port: i32,

    /// Timestamp of the last discovery attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<DateTime<Utc>>,

    /// Last discovery error, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl MetricsSourceStatus {
    /// Compare everything but the sync timestamp.
    pub fn same_observation(&self, other: &MetricsSourceStatus) -> bool {
        self.synced == other.synced
            && self.metrics_count == other.metrics_count
            && self.service == other.service
            && self.port == other.port
            && self.message == other.message
    }
}

// =============================================================================
// Implementations
// =============================================================================

impl MetricsSource {
    /// Whether the object carries a deletion timestamp
    pub fn is_marked_for_deletion(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Registry input for this object
    pub fn descriptor(&self) -> SourceDescriptor {
        let mut kinds: Vec<MetricKind> = Vec::new();
        for t in &self.spec.metric_types {
            let kind = MetricKind::from(*t);
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }

        SourceDescriptor {
            name: self.name_any(),
            priority: self.spec.priority,
            insecure_skip_tls_verify: self.spec.insecure_skip_tls_verify,
            backend: self.spec.metrics_service_backend.clone(),
            metric_kinds: kinds,
        }
    }

    /// Status reflecting the outcome of a registry update
    pub fn observed_status(&self, outcome: &Result<usize, Error>) -> MetricsSourceStatus {
        let backend = &self.spec.metrics_service_backend;
        let (synced, metrics_count, message) = match outcome {
            Ok(count) => (true, *count as u64, None),
            Err(e) => (false, 0, Some(e.to_string())),
        };

        MetricsSourceStatus {
            synced,
            metrics_count,
            service: backend.namespaced_name(),
            port: backend.port.port(),
            last_sync_time: Some(Utc::now()),
            message,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
