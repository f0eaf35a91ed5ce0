//! Domain Layer
//!
//! - **Metrics** (`metrics.rs`) - metric identifiers and metric API wire types
//! - **Ports** (`ports.rs`) - trait abstractions over metrics backends

pub mod metrics;
pub mod ports;

pub use metrics::{
    ApiResource, ApiResourceList, CustomMetricInfo, ExternalMetricInfo, ExternalMetricValue,
    ExternalMetricValueList, GroupResource, MetricIdentifier, MetricInfo, MetricKind, MetricValue,
    MetricValueList, NamespacedName, ObjectReference, CUSTOM_METRICS_API_VERSION,
    CUSTOM_METRICS_DISCOVERY_VERSION, EXTERNAL_METRICS_API_VERSION,
};
pub use ports::{MetricsClient, MetricsClientProvider, SourceDescriptor};
