//! Metrics Router - Custom and External Metrics Routing for Kubernetes
//!
//! Serves the `custom.metrics.k8s.io` and `external.metrics.k8s.io` APIs by
//! routing every query to one of several registered metrics backends.
//! Backends are declared as `MetricsSource` objects; when more than one
//! serves the same metric, the source with the highest priority wins, ties
//! broken by name.
//!
//! # Architecture
//!
//! ```text
//! MetricsSource ──▶ Controller ──▶ Registry ◀── RoutedMetricsProvider ◀── API server
//!                                    │
//!                                    └──▶ MetricsClient (per source)
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Metrics backend clients (HTTP and in-memory)
//! - [`controller`] - Reconciliation loop for MetricsSource objects
//! - [`crd`] - Custom Resource Definitions for Kubernetes
//! - [`domain`] - Metric identifiers and backend ports
//! - [`error`] - Error types
//! - [`provider`] - Routed metrics provider
//! - [`registry`] - Metric source registry
//! - [`server`] - Metrics API, health and Prometheus servers
//! - [`telemetry`] - Prometheus collectors

pub mod adapters;
pub mod controller;
pub mod crd;
pub mod domain;
pub mod error;
pub mod provider;
pub mod registry;
pub mod server;
pub mod telemetry;

// Re-export commonly used types
pub use crd::{MetricsSource, MetricsSourceSpec, MetricsSourceStatus};
pub use domain::{CustomMetricInfo, ExternalMetricInfo, MetricInfo, MetricKind, SourceDescriptor};
pub use error::{Error, Result};
pub use provider::RoutedMetricsProvider;
pub use registry::Registry;
pub use telemetry::RouterMetrics;
