//! Metrics API façade
//!
//! Maps `custom.metrics.k8s.io` and `external.metrics.k8s.io` request paths
//! onto the routed provider.
//!
//! | Path (under `/apis/<group>/<version>`)                  | Request                 |
//! |---------------------------------------------------------|-------------------------|
//! | (none)                                                  | discovery               |
//! | `/<resource>/<name>/<metric>`                           | root-scoped object      |
//! | `/namespaces/<ns>/metrics/<metric>`                     | the namespace itself    |
//! | `/namespaces/<ns>/<resource>/<name>/<metric>`           | namespaced object       |
//! | `/namespaces/<ns>/<metric>` (external)                  | external metric         |
//!
//! An object name of `*` selects objects by `labelSelector`.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;
use url::form_urlencoded;

use crate::domain::{
    ApiResourceList, CustomMetricInfo, ExternalMetricInfo, GroupResource, NamespacedName,
    CUSTOM_METRICS_API_VERSION, CUSTOM_METRICS_DISCOVERY_VERSION, EXTERNAL_METRICS_API_VERSION,
};
use crate::error::{Error, Result};
use crate::provider::RoutedMetricsProvider;

/// A parsed metrics API request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiRequest {
    CustomDiscovery {
        group_version: String,
    },
    CustomMetricByName {
        name: NamespacedName,
        info: CustomMetricInfo,
        metric_selector: Option<String>,
    },
    CustomMetricBySelector {
        namespace: String,
        info: CustomMetricInfo,
        selector: Option<String>,
        metric_selector: Option<String>,
    },
    ExternalDiscovery,
    ExternalMetric {
        namespace: String,
        info: ExternalMetricInfo,
        metric_selector: Option<String>,
    },
}

/// Parse a request path and query string; `None` for unknown paths.
pub fn parse_request(path: &str, query: Option<&str>) -> Option<ApiRequest> {
    let segments: Vec<String> = path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::decode(s).map(|d| d.into_owned()))
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
    let params = QueryParams::parse(query.unwrap_or_default());

    match segments.as_slice() {
        ["apis", group, version, rest @ ..] => {
            let group_version = format!("{}/{}", group, version);
            if group_version == CUSTOM_METRICS_DISCOVERY_VERSION && rest.is_empty() {
                return Some(ApiRequest::CustomDiscovery { group_version });
            }
            if group_version == CUSTOM_METRICS_API_VERSION {
                return parse_custom(group_version, rest, &params);
            }
            if group_version == EXTERNAL_METRICS_API_VERSION {
                return parse_external(rest, &params);
            }
            None
        }
        _ => None,
    }
}

fn parse_custom(group_version: String, rest: &[&str], params: &QueryParams) -> Option<ApiRequest> {
    let (namespace, resource, object, metric, namespaced) = match rest {
        [] => return Some(ApiRequest::CustomDiscovery { group_version }),
        [resource, object, metric] => ("", *resource, *object, *metric, false),
        ["namespaces", namespace, "metrics", metric] => {
            ("", "namespaces", *namespace, *metric, false)
        }
        ["namespaces", namespace, resource, object, metric] => {
            (*namespace, *resource, *object, *metric, true)
        }
        _ => return None,
    };

    let info = CustomMetricInfo::new(GroupResource::parse(resource), namespaced, metric);
    let metric_selector = params.get("metricLabelSelector");

    if object == "*" {
        Some(ApiRequest::CustomMetricBySelector {
            namespace: namespace.to_string(),
            info,
            selector: params.get("labelSelector"),
            metric_selector,
        })
    } else {
        Some(ApiRequest::CustomMetricByName {
            name: NamespacedName::new(namespace, object),
            info,
            metric_selector,
        })
    }
}

fn parse_external(rest: &[&str], params: &QueryParams) -> Option<ApiRequest> {
    match rest {
        [] => Some(ApiRequest::ExternalDiscovery),
        ["namespaces", namespace, metric] => Some(ApiRequest::ExternalMetric {
            namespace: namespace.to_string(),
            info: ExternalMetricInfo::new(*metric),
            metric_selector: params.get("labelSelector"),
        }),
        _ => None,
    }
}

/// Decoded `key=value` pairs of a query string.
#[derive(Debug, Default)]
struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    /// Invalid UTF-8 after percent-decoding is replaced, never kept encoded.
    fn parse(query: &str) -> Self {
        Self(form_urlencoded::parse(query.as_bytes()).into_owned().collect())
    }

    /// First non-empty value of `key`.
    fn get(&self, key: &str) -> Option<String> {
        self.0
            .iter()
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.clone())
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Serve `request`, returning the HTTP status and JSON body.
pub async fn dispatch(provider: &RoutedMetricsProvider, request: ApiRequest) -> (u16, Value) {
    debug!(?request, "Serving metrics API request");
    match serve(provider, request).await {
        Ok(body) => (200, body),
        Err(e) => {
            debug!(error = %e, "Metrics API request failed");
            (e.http_status(), error_status(&e))
        }
    }
}

async fn serve(provider: &RoutedMetricsProvider, request: ApiRequest) -> Result<Value> {
    match request {
        ApiRequest::CustomDiscovery { group_version } => {
            let infos = provider.list_all_metrics();
            to_value(&ApiResourceList::for_custom_metrics(&group_version, &infos))
        }
        ApiRequest::CustomMetricByName {
            name,
            info,
            metric_selector,
        } => {
            let value = provider
                .get_metric_by_name(&name, &info, metric_selector.as_deref())
                .await?;
            value_list("MetricValueList", CUSTOM_METRICS_API_VERSION, &[value])
        }
        ApiRequest::CustomMetricBySelector {
            namespace,
            info,
            selector,
            metric_selector,
        } => {
            let list = provider
                .get_metric_by_selector(
                    &namespace,
                    selector.as_deref(),
                    &info,
                    metric_selector.as_deref(),
                )
                .await?;
            value_list("MetricValueList", CUSTOM_METRICS_API_VERSION, &list.items)
        }
        ApiRequest::ExternalDiscovery => {
            let infos = provider.list_all_external_metrics();
            to_value(&ApiResourceList::for_external_metrics(&infos))
        }
        ApiRequest::ExternalMetric {
            namespace,
            info,
            metric_selector,
        } => {
            let list = provider
                .get_external_metric(&namespace, metric_selector.as_deref(), &info)
                .await?;
            value_list(
                "ExternalMetricValueList",
                EXTERNAL_METRICS_API_VERSION,
                &list.items,
            )
        }
    }
}

fn to_value<T: Serialize>(body: &T) -> Result<Value> {
    Ok(serde_json::to_value(body)?)
}

fn value_list<T: Serialize>(kind: &str, api_version: &str, items: &[T]) -> Result<Value> {
    Ok(json!({
        "kind": kind,
        "apiVersion": api_version,
        "metadata": {},
        "items": serde_json::to_value(items)?,
    }))
}

/// Kubernetes `Status` body for `error`.
pub fn error_status(error: &Error) -> Value {
    status_body(error.http_status(), error.status_reason(), &error.to_string())
}

/// Kubernetes `Status` body for a path no route matches.
pub fn not_found_status() -> Value {
    status_body(404, "NotFound", "the server could not find the requested resource")
}

/// Kubernetes `Status` body for a non-GET request.
pub fn method_not_allowed_status() -> Value {
    status_body(405, "MethodNotAllowed", "only GET is supported")
}

fn status_body(code: u16, reason: &str, message: &str) -> Value {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code,
    })
}
