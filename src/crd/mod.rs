//! Custom Resource Definitions
//!
//! This module contains all CRD definitions used by the router.

mod metrics_source;

pub use metrics_source::{
    MetricType, MetricsServiceBackend, MetricsSource, MetricsSourceSpec, MetricsSourceStatus,
    ServiceBackendPort, UriScheme, DEFAULT_BACKEND_PORT,
};
