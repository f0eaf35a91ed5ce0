//! MetricsSource Controller
//!
//! Keeps the registry in sync with MetricsSource objects and reports the
//! outcome of each discovery in the object's status.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::finalizer::{finalizer, Event as Finalizer};
use kube::runtime::watcher::Config;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use crate::crd::{MetricsSource, MetricsSourceStatus};
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::telemetry::RouterMetrics;

/// Finalizer guaranteeing a deleted source leaves the registry.
pub const REGISTRY_FINALIZER: &str = "metricsrouter.io/registry-cleanup";

/// Field manager used for status patches.
const FIELD_MANAGER: &str = "metrics-router";

/// Delay before retrying a failed reconciliation.
const ERROR_REQUEUE: Duration = Duration::from_secs(60);

/// Shared context for the controller
pub struct ControllerContext {
    /// Kubernetes client
    pub client: Client,

    /// Registry fed by this controller
    pub registry: Arc<Registry>,

    /// Reconcile counters
    pub metrics: Arc<RouterMetrics>,

    /// Delay between two discoveries of a healthy source
    pub requeue_interval: Duration,

    /// Set once the controller is watching
    pub ready: Arc<AtomicBool>,
}

impl ControllerContext {
    /// Create a new controller context
    pub fn new(
        client: Client,
        registry: Arc<Registry>,
        metrics: Arc<RouterMetrics>,
        requeue_interval: Duration,
        ready: Arc<AtomicBool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            registry,
            metrics,
            requeue_interval,
            ready,
        })
    }
}

/// Run the MetricsSource controller
pub async fn run(ctx: Arc<ControllerContext>) -> Result<()> {
    let sources: Api<MetricsSource> = Api::all(ctx.client.clone());

    // Check if CRD exists
    if let Err(e) = sources.list(&ListParams::default().limit(1)).await {
        error!(
            "MetricsSource CRD not found: {}. Please install the CRD first.",
            e
        );
        return Err(Error::Kube(e));
    }

    info!("Starting MetricsSource controller");
    ctx.ready.store(true, Ordering::SeqCst);

    Controller::new(sources, Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx.clone())
        .for_each(|res| async move {
            match res {
                Ok(o) => debug!("Reconciled {:?}", o),
                Err(e) => error!("Reconcile failed: {:?}", e),
            }
        })
        .await;

    ctx.ready.store(false, Ordering::SeqCst);
    info!("Controller shutdown complete");
    Ok(())
}

/// Reconcile a MetricsSource resource
#[instrument(skip(source, ctx), fields(source = %source.name_any()))]
async fn reconcile(source: Arc<MetricsSource>, ctx: Arc<ControllerContext>) -> Result<Action> {
    let api: Api<MetricsSource> = Api::all(ctx.client.clone());

    // Deleted before our finalizer was ever added
    if source.is_marked_for_deletion() && !has_registry_finalizer(&source) {
        ctx.registry.delete_source(&source.name_any());
        return Ok(Action::await_change());
    }

    let result = finalizer(&api, REGISTRY_FINALIZER, source, |event| async {
        match event {
            Finalizer::Apply(source) => apply(source, &api, &ctx).await,
            Finalizer::Cleanup(source) => cleanup(source, &ctx),
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)));

    ctx.metrics.record_reconcile(result.is_ok());
    result
}

/// Register or refresh the source, then report the outcome in its status.
async fn apply(
    source: Arc<MetricsSource>,
    api: &Api<MetricsSource>,
    ctx: &ControllerContext,
) -> Result<Action> {
    let name = source.name_any();
    info!("Syncing metrics from {}", source.spec.metrics_service_backend.url());

    let outcome = ctx.registry.add_or_update_source(&source.descriptor()).await;
    let status = source.observed_status(&outcome);

    let patched = if needs_status_update(source.status.as_ref(), &status) {
        patch_status(api, &name, &status).await
    } else {
        Ok(())
    };

    match outcome {
        Ok(count) => {
            info!("{} metrics loaded from {}", count, name);
            patched?;
            Ok(Action::requeue(ctx.requeue_interval))
        }
        Err(e) => {
            if let Err(patch_err) = patched {
                warn!("Failed to report sync failure for {}: {}", name, patch_err);
            }
            Err(e)
        }
    }
}

/// Drop the source from the registry before the object goes away.
fn cleanup(source: Arc<MetricsSource>, ctx: &ControllerContext) -> Result<Action> {
    let name = source.name_any();
    if ctx.registry.delete_source(&name) {
        info!("Metrics source {} unregistered", name);
    }
    Ok(Action::await_change())
}

async fn patch_status(
    api: &Api<MetricsSource>,
    name: &str,
    status: &MetricsSourceStatus,
) -> Result<()> {
    let patch = serde_json::json!({ "status": status });
    api.patch_status(
        name,
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;
    Ok(())
}

/// Whether `observed` differs from the status currently stored.
fn needs_status_update(
    current: Option<&MetricsSourceStatus>,
    observed: &MetricsSourceStatus,
) -> bool {
    match current {
        Some(current) => !current.same_observation(observed),
        None => true,
    }
}

fn has_registry_finalizer(source: &MetricsSource) -> bool {
    source
        .finalizers()
        .iter()
        .any(|name| name == REGISTRY_FINALIZER)
}

/// Error policy for the controller
fn error_policy(source: Arc<MetricsSource>, error: &Error, _ctx: Arc<ControllerContext>) -> Action {
    error!("Reconciliation error for {}: {}", source.name_any(), error);
    Action::requeue(ERROR_REQUEUE)
}

// =============================================================================
// Tests
// =============================================================================
