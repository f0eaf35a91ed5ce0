//! Error types for the Metrics Router

use thiserror::Error;

use crate::domain::MetricKind;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Metrics Router
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Finalizer handling failed while reconciling a MetricsSource
    #[error("Finalizer error: {0}")]
    Finalizer(#[source] Box<kube::runtime::finalizer::Error<Error>>),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // =========================================================================
    // Registry Errors
    // =========================================================================
    /// No registered source currently exposes the metric
    #[error("{kind} metric {metric} is not provided by any metrics backend")]
    MetricNotFound { kind: MetricKind, metric: String },

    /// A ranking list selected a source that is missing from the directory
    #[error("Registry is inconsistent: metrics source {source_name} is indexed but not registered")]
    InconsistentRegistry { source_name: String },

    /// Discovery of a source's metrics failed; the registry was left untouched
    #[error("Failed to list {kind} metrics for source {source_name}: {source}")]
    Discovery {
        source_name: String,
        kind: MetricKind,
        #[source]
        source: Box<Error>,
    },

    // =========================================================================
    // Backend Errors
    // =========================================================================
    /// Backend connection error
    #[error("Metrics backend connection error: {0}")]
    BackendConnection(#[source] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("Metrics backend {url} returned status {status}")]
    BackendStatus { url: String, status: u16 },

    /// Backend response could not be decoded
    #[error("Failed to parse metrics backend response: {0}")]
    BackendResponse(String),

    // =========================================================================
    // Process Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Prometheus collector error
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] prometheus::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when no backend serves the requested metric.
    ///
    /// An [`Error::InconsistentRegistry`] is never a "not found".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::MetricNotFound { .. })
    }

    /// HTTP status code the serving façade answers with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::MetricNotFound { .. } => 404,
            Error::BackendStatus { status, .. } if (400..500).contains(status) => *status,
            Error::BackendStatus { .. }
            | Error::BackendConnection(_)
            | Error::BackendResponse(_)
            | Error::Discovery { .. } => 503,
            _ => 500,
        }
    }

    /// Kubernetes `Status.reason` matching [`Error::http_status`].
    pub fn status_reason(&self) -> &'static str {
        match self.http_status() {
            400 => "BadRequest",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "NotFound",
            503 => "ServiceUnavailable",
            _ => "InternalError",
        }
    }
}
