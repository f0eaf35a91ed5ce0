//! Routed metrics provider
//!
//! Answers metric queries by resolving the winning source in the registry
//! and delegating the fetch to that source's client.

use std::sync::Arc;

use tracing::debug;

use crate::domain::{
    CustomMetricInfo, ExternalMetricInfo, ExternalMetricValueList, MetricValue, MetricValueList,
    NamespacedName,
};
use crate::error::Result;
use crate::registry::Registry;

/// Custom and external metrics provider backed by the registry.
#[derive(Debug, Clone)]
pub struct RoutedMetricsProvider {
    registry: Arc<Registry>,
}

impl RoutedMetricsProvider {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub async fn get_metric_by_name(
        &self,
        name: &NamespacedName,
        info: &CustomMetricInfo,
        metric_selector: Option<&str>,
    ) -> Result<MetricValue> {
        let client = self.registry.resolve_custom(info)?;
        debug!(object = %name, metric = %info, "Fetching custom metric");
        client.get_metric_by_name(name, info, metric_selector).await
    }

    pub async fn get_metric_by_selector(
        &self,
        namespace: &str,
        selector: Option<&str>,
        info: &CustomMetricInfo,
        metric_selector: Option<&str>,
    ) -> Result<MetricValueList> {
        let client = self.registry.resolve_custom(info)?;
        client
            .get_metric_by_selector(namespace, selector, info, metric_selector)
            .await
    }

    pub fn list_all_metrics(&self) -> Vec<CustomMetricInfo> {
        let mut all = self.registry.list_all_custom_metrics();
        all.sort();
        all
    }

    pub async fn get_external_metric(
        &self,
        namespace: &str,
        metric_selector: Option<&str>,
        info: &ExternalMetricInfo,
    ) -> Result<ExternalMetricValueList> {
        let client = self.registry.resolve_external(info)?;
        client
            .get_external_metric(namespace, info, metric_selector)
            .await
    }

    pub fn list_all_external_metrics(&self) -> Vec<ExternalMetricInfo> {
        let mut all = self.registry.list_all_external_metrics();
        all.sort();
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryClientProvider;
    use crate::crd::MetricsServiceBackend;
    use crate::domain::{GroupResource, MetricKind, SourceDescriptor};
    use crate::error::Error;
    use assert_matches::assert_matches;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    fn rps() -> CustomMetricInfo {
        CustomMetricInfo::new(GroupResource::parse("pods"), true, "rps")
    }

    async fn provider_with_two_backends() -> RoutedMetricsProvider {
        let backends = Arc::new(InMemoryClientProvider::new());
        backends.expose_custom_metrics("low", [rps()]);
        backends.expose_custom_metrics("high", [rps()]);
        backends.expose_external_metrics("high", [ExternalMetricInfo::new("queue_depth")]);
        backends.set_value("low", "1");
        backends.set_value("high", "2");

        let registry = Arc::new(Registry::new(backends));
        for (name, priority) in [("low", 1), ("high", 2)] {
            let descriptor =
                SourceDescriptor::new(name, priority, MetricsServiceBackend::new("fakens", name))
                    .with_kinds([MetricKind::Custom, MetricKind::External]);
            registry.add_or_update_source(&descriptor).await.unwrap();
        }
        RoutedMetricsProvider::new(registry)
    }

    #[tokio::test]
    async fn test_fetch_goes_to_winning_backend() {
        let provider = provider_with_two_backends().await;

        let value = provider
            .get_metric_by_name(&NamespacedName::new("default", "web-0"), &rps(), None)
            .await
            .unwrap();
        assert_eq!(value.value, Quantity("2".to_string()));

        let list = provider
            .get_metric_by_selector("default", Some("app=web"), &rps(), None)
            .await
            .unwrap();
        assert_eq!(list.items.len(), 1);
        assert_eq!(list.items[0].value, Quantity("2".to_string()));
    }

    #[tokio::test]
    async fn test_fallback_after_source_removal() {
        let provider = provider_with_two_backends().await;
        provider.registry().delete_source("high");

        let value = provider
            .get_metric_by_name(&NamespacedName::new("default", "web-0"), &rps(), None)
            .await
            .unwrap();
        assert_eq!(value.value, Quantity("1".to_string()));
        assert_matches!(
            provider
                .get_external_metric("default", None, &ExternalMetricInfo::new("queue_depth"))
                .await,
            Err(Error::MetricNotFound { kind: MetricKind::External, .. })
        );
    }

    #[tokio::test]
    async fn test_unknown_metric_is_not_found() {
        let provider = provider_with_two_backends().await;
        let unknown = CustomMetricInfo::new(GroupResource::parse("pods"), true, "latency");

        let err = provider
            .get_metric_by_selector("default", None, &unknown, None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_listings() {
        let provider = provider_with_two_backends().await;
        assert_eq!(provider.list_all_metrics(), vec![rps()]);
        assert_eq!(
            provider.list_all_external_metrics(),
            vec![ExternalMetricInfo::new("queue_depth")]
        );
    }
}
