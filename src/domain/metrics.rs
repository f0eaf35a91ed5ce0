//! Metric identifiers and metric API wire types
//!
//! Identifiers are value types with structural equality: two sources that
//! expose the same `pods/http_requests` metric share one index entry.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use serde::{Deserialize, Serialize};

/// API group/version of the custom metrics API used for discovery.
pub const CUSTOM_METRICS_DISCOVERY_VERSION: &str = "custom.metrics.k8s.io/v1beta1";

/// API group/version of the custom metrics API used for value queries.
pub const CUSTOM_METRICS_API_VERSION: &str = "custom.metrics.k8s.io/v1beta2";

/// API group/version of the external metrics API.
pub const EXTERNAL_METRICS_API_VERSION: &str = "external.metrics.k8s.io/v1beta1";

// =============================================================================
// Identifiers
// =============================================================================

/// Kind of metric a source may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    Custom,
    External,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Custom => write!(f, "custom"),
            MetricKind::External => write!(f, "external"),
        }
    }
}

/// A Kubernetes group/resource pair, e.g. `deployments.apps`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupResource {
    pub group: String,
    pub resource: String,
}

impl GroupResource {
    pub fn new(group: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            resource: resource.into(),
        }
    }

    /// Parse `resource` or `resource.group`, splitting at the first dot.
    pub fn parse(s: &str) -> Self {
        match s.split_once('.') {
            Some((resource, group)) => Self::new(group, resource),
            None => Self::new("", s),
        }
    }
}

impl fmt::Display for GroupResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.resource)
        } else {
            write!(f, "{}.{}", self.resource, self.group)
        }
    }
}

/// Identifies a custom metric for one kind of described object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CustomMetricInfo {
    pub group_resource: GroupResource,
    pub namespaced: bool,
    pub metric: String,
}

impl CustomMetricInfo {
    pub fn new(group_resource: GroupResource, namespaced: bool, metric: impl Into<String>) -> Self {
        Self {
            group_resource,
            namespaced,
            metric: metric.into(),
        }
    }

    /// Parse a discovery resource name of the form `<group-resource>/<metric>`.
    ///
    /// Returns `None` for malformed names.
    pub fn from_resource_name(name: &str, namespaced: bool) -> Option<Self> {
        let (group_resource, metric) = name.split_once('/')?;
        if group_resource.is_empty() || metric.is_empty() {
            return None;
        }
        Some(Self::new(GroupResource::parse(group_resource), namespaced, metric))
    }

    /// Name under which the metric is advertised in discovery documents.
    pub fn resource_name(&self) -> String {
        format!("{}/{}", self.group_resource, self.metric)
    }
}

impl fmt::Display for CustomMetricInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = if self.namespaced { "namespaced" } else { "root" };
        write!(f, "{} ({})", self.resource_name(), scope)
    }
}

/// Identifies an external metric by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExternalMetricInfo {
    pub metric: String,
}

impl ExternalMetricInfo {
    pub fn new(metric: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
        }
    }
}

impl fmt::Display for ExternalMetricInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.metric)
    }
}

/// A metric identifier of either kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetricInfo {
    Custom(CustomMetricInfo),
    External(ExternalMetricInfo),
}

impl MetricInfo {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricInfo::Custom(_) => MetricKind::Custom,
            MetricInfo::External(_) => MetricKind::External,
        }
    }

    pub fn metric_name(&self) -> &str {
        match self {
            MetricInfo::Custom(info) => &info.metric,
            MetricInfo::External(info) => &info.metric,
        }
    }
}

impl From<CustomMetricInfo> for MetricInfo {
    fn from(info: CustomMetricInfo) -> Self {
        MetricInfo::Custom(info)
    }
}

impl From<ExternalMetricInfo> for MetricInfo {
    fn from(info: ExternalMetricInfo) -> Self {
        MetricInfo::External(info)
    }
}

impl fmt::Display for MetricInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricInfo::Custom(info) => write!(f, "custom metric {}", info),
            MetricInfo::External(info) => write!(f, "external metric {}", info),
        }
    }
}

/// Namespace and name of a described object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

// =============================================================================
// Discovery Documents
// =============================================================================

/// Subset of `metav1.APIResourceList` served and consumed by metrics APIs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResourceList {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub group_version: String,
    #[serde(default)]
    pub resources: Vec<ApiResource>,
}

/// Subset of `metav1.APIResource`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResource {
    pub name: String,
    #[serde(default)]
    pub singular_name: String,
    #[serde(default)]
    pub namespaced: bool,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub verbs: Vec<String>,
}

impl ApiResourceList {
    /// Discovery document advertising the given custom metrics.
    pub fn for_custom_metrics<'a>(
        group_version: &str,
        infos: impl IntoIterator<Item = &'a CustomMetricInfo>,
    ) -> Self {
        let resources = infos
            .into_iter()
            .map(|info| ApiResource {
                name: info.resource_name(),
                namespaced: info.namespaced,
                kind: "MetricValueList".to_string(),
                verbs: vec!["get".to_string()],
                ..Default::default()
            })
            .collect();
        Self::new(group_version, resources)
    }

    /// Discovery document advertising the given external metrics.
    pub fn for_external_metrics<'a>(
        infos: impl IntoIterator<Item = &'a ExternalMetricInfo>,
    ) -> Self {
        let resources = infos
            .into_iter()
            .map(|info| ApiResource {
                name: info.metric.clone(),
                namespaced: true,
                kind: "ExternalMetricValueList".to_string(),
                verbs: vec!["get".to_string()],
                ..Default::default()
            })
            .collect();
        Self::new(EXTERNAL_METRICS_API_VERSION, resources)
    }

    fn new(group_version: &str, resources: Vec<ApiResource>) -> Self {
        Self {
            kind: "APIResourceList".to_string(),
            api_version: "v1".to_string(),
            group_version: group_version.to_string(),
            resources,
        }
    }
}

// =============================================================================
// Metric Values
// =============================================================================

/// Reference to the object a custom metric describes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

/// Wire form of the metric a value was computed for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricIdentifier {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,
}

/// One custom metric value (`custom.metrics.k8s.io/v1beta2`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValue {
    pub described_object: ObjectReference,
    pub metric: MetricIdentifier,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_seconds: Option<i64>,
    pub value: Quantity,
}

/// List of custom metric values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricValueList {
    #[serde(default)]
    pub items: Vec<MetricValue>,
}

/// One external metric value (`external.metrics.k8s.io/v1beta1`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalMetricValue {
    pub metric_name: String,
    #[serde(default)]
    pub metric_labels: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_seconds: Option<i64>,
    pub value: Quantity,
}

/// List of external metric values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalMetricValueList {
    #[serde(default)]
    pub items: Vec<ExternalMetricValue>,
}
