//! Controller module
//!
//! Implements the Kubernetes reconciliation loop for MetricsSource resources.

mod metrics_source;

pub use metrics_source::{run, ControllerContext, REGISTRY_FINALIZER};
