//! Metrics API Adapter
//!
//! Implements the `MetricsClient` port over HTTP against a backend serving
//! the `custom.metrics.k8s.io` and `external.metrics.k8s.io` APIs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Certificate, Client};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::form_urlencoded;

use crate::crd::MetricsServiceBackend;
use crate::domain::ports::{MetricsClient, MetricsClientProvider, SourceDescriptor};
use crate::domain::{
    ApiResourceList, CustomMetricInfo, ExternalMetricInfo, ExternalMetricValueList,
    MetricValue, MetricValueList, NamespacedName, CUSTOM_METRICS_API_VERSION,
    CUSTOM_METRICS_DISCOVERY_VERSION, EXTERNAL_METRICS_API_VERSION,
};
use crate::error::{Error, Result};

/// Default in-cluster service account mount.
pub const DEFAULT_SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

// =============================================================================
// Configuration
// =============================================================================

/// Settings shared by every backend client.
#[derive(Debug, Clone)]
pub struct BackendClientConfig {
    /// Per-request timeout
    pub timeout: Duration,

    /// Directory holding `ca.crt` and `token`
    pub service_account_dir: PathBuf,
}

impl Default for BackendClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            service_account_dir: PathBuf::from(DEFAULT_SERVICE_ACCOUNT_DIR),
        }
    }
}

// =============================================================================
// Client Provider
// =============================================================================

/// Builds [`HttpMetricsClient`]s for registered sources.
pub struct HttpClientProvider {
    config: BackendClientConfig,
    ca_certificate: Option<Certificate>,
}

impl HttpClientProvider {
    /// Create a provider, loading the cluster CA if it is mounted.
    pub fn new(config: BackendClientConfig) -> Result<Self> {
        let ca_certificate = match read_optional(&config.service_account_dir.join("ca.crt"))? {
            Some(pem) => Some(Certificate::from_pem(&pem).map_err(|e| {
                Error::Config(format!("invalid service account CA certificate: {}", e))
            })?),
            None => {
                debug!(
                    dir = %config.service_account_dir.display(),
                    "No service account CA found, using system roots"
                );
                None
            }
        };

        Ok(Self {
            config,
            ca_certificate,
        })
    }
}

impl std::fmt::Debug for HttpClientProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClientProvider")
            .field("config", &self.config)
            .field("has_ca_certificate", &self.ca_certificate.is_some())
            .finish()
    }
}

impl MetricsClientProvider for HttpClientProvider {
    fn new_client(&self, descriptor: &SourceDescriptor) -> Result<Arc<dyn MetricsClient>> {
        let mut builder = Client::builder().timeout(self.config.timeout);
        if descriptor.insecure_skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        } else if let Some(ca) = &self.ca_certificate {
            builder = builder.add_root_certificate(ca.clone());
        }

        let http = builder.build().map_err(|e| {
            Error::Internal(format!(
                "Failed to create HTTP client for {}: {}",
                descriptor.backend.url(),
                e
            ))
        })?;

        Ok(Arc::new(HttpMetricsClient {
            base_url: descriptor.backend.url(),
            backend: descriptor.backend.clone(),
            token_path: self.config.service_account_dir.join("token"),
            http,
        }))
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Bearer token, read per request so rotated tokens are picked up.
async fn read_token(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(token) => Ok(Some(token.trim().to_string()).filter(|t| !t.is_empty())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for one metrics backend.
pub struct HttpMetricsClient {
    backend: MetricsServiceBackend,
    base_url: String,
    token_path: PathBuf,
    http: Client,
}

impl std::fmt::Debug for HttpMetricsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMetricsClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HttpMetricsClient {
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Querying metrics backend: {}", url);

        let mut request = self.http.get(&url);
        if let Some(token) = read_token(&self.token_path).await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(Error::BackendConnection)?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::BackendStatus {
                url,
                status: status.as_u16(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Error::BackendResponse(format!("{}: {}", url, e)))
    }
}

#[async_trait]
impl MetricsClient for HttpMetricsClient {
    #[instrument(skip(self), fields(backend = %self.base_url))]
    async fn list_custom_metric_infos(&self) -> Result<HashSet<CustomMetricInfo>> {
        let list: ApiResourceList = self
            .get_json(&discovery_path(CUSTOM_METRICS_DISCOVERY_VERSION))
            .await?;
        Ok(parse_custom_resources(&self.base_url, &list))
    }

    #[instrument(skip(self), fields(backend = %self.base_url))]
    async fn list_external_metric_infos(&self) -> Result<HashSet<ExternalMetricInfo>> {
        let list: ApiResourceList = self
            .get_json(&discovery_path(EXTERNAL_METRICS_API_VERSION))
            .await?;
        Ok(parse_external_resources(&list))
    }

    async fn get_metric_by_name(
        &self,
        name: &NamespacedName,
        info: &CustomMetricInfo,
        metric_selector: Option<&str>,
    ) -> Result<MetricValue> {
        let path = custom_metric_path(&name.namespace, info, &name.name, None, metric_selector);
        let mut list: MetricValueList = self.get_json(&path).await?;
        if list.items.len() != 1 {
            return Err(Error::BackendResponse(format!(
                "expected exactly one value for {} {}, got {}",
                info,
                name,
                list.items.len()
            )));
        }
        Ok(list.items.remove(0))
    }

    async fn get_metric_by_selector(
        &self,
        namespace: &str,
        selector: Option<&str>,
        info: &CustomMetricInfo,
        metric_selector: Option<&str>,
    ) -> Result<MetricValueList> {
        let path = custom_metric_path(namespace, info, "*", selector, metric_selector);
        self.get_json(&path).await
    }

    async fn get_external_metric(
        &self,
        namespace: &str,
        info: &ExternalMetricInfo,
        metric_selector: Option<&str>,
    ) -> Result<ExternalMetricValueList> {
        self.get_json(&external_metric_path(namespace, info, metric_selector))
            .await
    }

    fn backend(&self) -> &MetricsServiceBackend {
        &self.backend
    }
}

// =============================================================================
// Paths and Parsing
// =============================================================================

fn discovery_path(group_version: &str) -> String {
    format!("/apis/{}", group_version)
}

/// Value path for a custom metric; `object` is `*` for selector queries.
fn custom_metric_path(
    namespace: &str,
    info: &CustomMetricInfo,
    object: &str,
    selector: Option<&str>,
    metric_selector: Option<&str>,
) -> String {
    let mut path = format!("/apis/{}", CUSTOM_METRICS_API_VERSION);
    if info.namespaced && !namespace.is_empty() {
        path.push_str(&format!("/namespaces/{}", urlencoding::encode(namespace)));
    }

    let object = if object == "*" {
        "*".to_string()
    } else {
        urlencoding::encode(object).into_owned()
    };
    path.push_str(&format!(
        "/{}/{}/{}",
        urlencoding::encode(&info.group_resource.to_string()),
        object,
        urlencoding::encode(&info.metric)
    ));

    path + &query_string(&[
        ("labelSelector", selector),
        ("metricLabelSelector", metric_selector),
    ])
}

fn external_metric_path(
    namespace: &str,
    info: &ExternalMetricInfo,
    metric_selector: Option<&str>,
) -> String {
    format!(
        "/apis/{}/namespaces/{}/{}{}",
        EXTERNAL_METRICS_API_VERSION,
        urlencoding::encode(namespace),
        urlencoding::encode(&info.metric),
        query_string(&[("labelSelector", metric_selector)])
    )
}

fn query_string(params: &[(&str, Option<&str>)]) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    for &(key, value) in params {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            query.append_pair(key, value);
        }
    }

    let query = query.finish();
    if query.is_empty() {
        query
    } else {
        format!("?{}", query)
    }
}

/// Custom metrics advertised in a discovery document, skipping malformed names.
fn parse_custom_resources(backend: &str, list: &ApiResourceList) -> HashSet<CustomMetricInfo> {
    list.resources
        .iter()
        .filter_map(|r| {
            let info = CustomMetricInfo::from_resource_name(&r.name, r.namespaced);
            if info.is_none() {
                warn!(
                    backend = %backend,
                    name = %r.name,
                    "Backend returned a malformed metric name, skipping"
                );
            }
            info
        })
        .collect()
}

fn parse_external_resources(list: &ApiResourceList) -> HashSet<ExternalMetricInfo> {
    list.resources
        .iter()
        .filter(|r| !r.name.is_empty())
        .map(|r| ExternalMetricInfo::new(r.name.clone()))
        .collect()
}
