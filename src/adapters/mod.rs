//! Infrastructure Adapters
//!
//! Implementations of the domain ports.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Ports (domain::ports)                     │
//! │         MetricsClientProvider  │  MetricsClient              │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Adapters (This Module)                     │
//! │  HttpClientProvider / HttpMetricsClient   (metrics APIs)     │
//! │  InMemoryClientProvider / InMemoryMetricsClient  (fixtures)  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod in_memory;
mod metrics_api;

pub use in_memory::{InMemoryClientProvider, InMemoryMetricsClient, FAKE_NAMESPACE};
pub use metrics_api::{
    BackendClientConfig, HttpClientProvider, HttpMetricsClient, DEFAULT_SERVICE_ACCOUNT_DIR,
};
