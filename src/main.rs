//! Metrics Router
//!
//! Routes Kubernetes custom and external metric queries to the backend
//! declared by the highest priority `MetricsSource` serving the metric.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Metrics Router                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │ MetricsSource│───▶│   Registry   │◀───│  API Server  │       │
//! │  │  Controller  │    │ (discovery + │    │   (routed    │       │
//! │  │              │    │   ranking)   │    │   provider)  │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kube::{Client, CustomResourceExt};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use metrics_router::adapters::{
    BackendClientConfig, HttpClientProvider, DEFAULT_SERVICE_ACCOUNT_DIR,
};
use metrics_router::controller::{self, ControllerContext};
use metrics_router::crd::MetricsSource;
use metrics_router::error::{Error, Result};
use metrics_router::server;
use metrics_router::{Registry, RoutedMetricsProvider, RouterMetrics};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Metrics Router - custom and external metrics routing for Kubernetes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Metrics API server bind address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:6443")]
    api_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Timeout of a single request to a metrics backend, in seconds
    #[arg(long, env = "BACKEND_TIMEOUT_SECONDS", default_value = "30")]
    backend_timeout_seconds: u64,

    /// Directory holding the service account CA and token
    #[arg(long, env = "SERVICE_ACCOUNT_DIR", default_value = DEFAULT_SERVICE_ACCOUNT_DIR)]
    service_account_dir: PathBuf,

    /// Interval between two discoveries of a healthy source, in seconds
    #[arg(long, env = "REQUEUE_INTERVAL_SECONDS", default_value = "300")]
    requeue_interval_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Print the MetricsSource CRD as YAML and exit
    #[arg(long)]
    print_crd: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_crd {
        let crd = serde_yaml::to_string(&MetricsSource::crd())
            .map_err(|e| Error::Internal(format!("Failed to render CRD: {}", e)))?;
        print!("{}", crd);
        return Ok(());
    }

    // Initialize logging
    init_logging(&args);

    info!("Starting Metrics Router");
    info!("  API address: {}", args.api_addr);
    info!("  Backend timeout: {}s", args.backend_timeout_seconds);
    info!("  Requeue interval: {}s", args.requeue_interval_seconds);

    // Create Kubernetes client
    let client = Client::try_default().await.map_err(|e| {
        error!("Failed to create Kubernetes client: {}", e);
        Error::Internal(format!("Kubernetes client creation failed: {}", e))
    })?;

    info!("Connected to Kubernetes cluster");

    let metrics = RouterMetrics::new()?;
    let client_provider = HttpClientProvider::new(BackendClientConfig {
        timeout: Duration::from_secs(args.backend_timeout_seconds),
        service_account_dir: args.service_account_dir.clone(),
    })?;
    let registry =
        Arc::new(Registry::new(Arc::new(client_provider)).with_metrics(metrics.clone()));
    let provider = Arc::new(RoutedMetricsProvider::new(registry.clone()));
    let ready = Arc::new(AtomicBool::new(false));

    let ctx = ControllerContext::new(
        client,
        registry,
        metrics.clone(),
        Duration::from_secs(args.requeue_interval_seconds),
        ready.clone(),
    );

    // Start health server
    let health_addr = args.health_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = server::run_health_server(&health_addr, ready).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = server::run_metrics_server(&metrics_addr, metrics).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Start metrics API server
    let api_addr = args.api_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = server::run_api_server(&api_addr, provider).await {
            error!("API server error: {}", e);
        }
    });

    // Run the controller
    controller::run(ctx).await?;

    info!("Metrics Router shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "kube=info", "tower=warn", "reqwest=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::parse_from(["metrics-router"]);
        assert_eq!(args.api_addr, "0.0.0.0:6443");
        assert_eq!(args.requeue_interval_seconds, 300);
        assert_eq!(
            args.service_account_dir,
            PathBuf::from(DEFAULT_SERVICE_ACCOUNT_DIR)
        );
        assert!(!args.print_crd);
    }

    #[test]
    fn test_crd_renders() {
        let crd = serde_yaml::to_string(&MetricsSource::crd()).unwrap();
        assert!(crd.contains("metricssources.metricsrouter.io"));
        assert!(crd.contains("scope: Cluster"));
    }
}
