//! Metrics Router Integration Tests
//!
//! Exercises the library through its public API:
//! - Registry routing scenarios
//! - Concurrent discovery and resolution
//! - Metrics API façade end to end

use std::collections::HashSet;
use std::sync::Arc;

use metrics_router::adapters::InMemoryClientProvider;
use metrics_router::crd::MetricsServiceBackend;
use metrics_router::domain::{
    CustomMetricInfo, ExternalMetricInfo, GroupResource, MetricKind, MetricsClient,
    SourceDescriptor,
};
use metrics_router::{Error, Registry, RoutedMetricsProvider};

fn pods(metric: &str) -> CustomMetricInfo {
    CustomMetricInfo::new(GroupResource::parse("pods"), true, metric)
}

fn descriptor(name: &str, priority: i32) -> SourceDescriptor {
    SourceDescriptor::new(name, priority, MetricsServiceBackend::new("fakens", name))
        .with_kinds([MetricKind::Custom, MetricKind::External])
}

fn winner(registry: &Registry, metric: &str) -> Option<String> {
    registry
        .resolve_custom(&pods(metric))
        .ok()
        .map(|client| client.backend().name.clone())
}

// =============================================================================
// Registry Routing
// =============================================================================

mod registry_tests {
    use super::*;
    use assert_matches::assert_matches;

    struct Case {
        name: &'static str,
        sources: Vec<(&'static str, i32, Vec<&'static str>)>,
        deleted: Vec<&'static str>,
        expected: Vec<(&'static str, Option<&'static str>)>,
        listed: Vec<&'static str>,
    }

    #[tokio::test]
    async fn test_routing_table() {
        let cases = vec![
            Case {
                name: "higher priority wins",
                sources: vec![
                    ("source1", 100, vec!["metric1", "metric2"]),
                    ("source2", 200, vec!["metric2"]),
                ],
                deleted: vec![],
                expected: vec![
                    ("metric1", Some("source1")),
                    ("metric2", Some("source2")),
                    ("metric3", None),
                ],
                listed: vec!["metric1", "metric2"],
            },
            Case {
                name: "update drops and adds metrics",
                sources: vec![
                    ("source1", 100, vec!["metric1", "metric2"]),
                    ("source2", 200, vec!["metric2"]),
                    ("source1", 300, vec!["metric1", "metric3"]),
                ],
                deleted: vec![],
                expected: vec![
                    ("metric2", Some("source2")),
                    ("metric3", Some("source1")),
                    ("metric4", None),
                ],
                listed: vec!["metric1", "metric2", "metric3"],
            },
            Case {
                name: "delete prunes the only exposer",
                sources: vec![
                    ("source1", 100, vec!["metric1", "metric2"]),
                    ("source2", 200, vec!["metric2"]),
                ],
                deleted: vec!["source1"],
                expected: vec![("metric1", None), ("metric2", Some("source2"))],
                listed: vec!["metric2"],
            },
            Case {
                name: "alphabetical tie break",
                sources: vec![("beta", 100, vec!["metricX"]), ("alpha", 100, vec!["metricX"])],
                deleted: vec![],
                expected: vec![("metricX", Some("alpha"))],
                listed: vec!["metricX"],
            },
            Case {
                name: "deleting everything empties the registry",
                sources: vec![("source1", 1, vec!["metric1"]), ("source2", 2, vec!["metric1"])],
                deleted: vec!["source2", "source1"],
                expected: vec![("metric1", None)],
                listed: vec![],
            },
        ];

        for case in cases {
            let provider = Arc::new(InMemoryClientProvider::new());
            let registry = Registry::new(provider.clone());

            for (name, priority, metrics) in &case.sources {
                provider.expose_custom_metrics(name, metrics.iter().map(|m| pods(m)));
                registry
                    .add_or_update_source(&descriptor(name, *priority))
                    .await
                    .unwrap();
            }
            for name in &case.deleted {
                assert!(registry.delete_source(name), "{}", case.name);
            }

            for (metric, expected) in &case.expected {
                assert_eq!(
                    winner(&registry, metric).as_deref(),
                    *expected,
                    "{}: {}",
                    case.name,
                    metric
                );
            }

            let mut listed: Vec<String> = registry
                .list_all_custom_metrics()
                .into_iter()
                .map(|m| m.metric)
                .collect();
            listed.sort();
            assert_eq!(listed, case.listed, "{}", case.name);
        }
    }

    #[tokio::test]
    async fn test_discovery_failure_is_atomic() {
        let provider = Arc::new(InMemoryClientProvider::new());
        let registry = Registry::new(provider.clone());
        provider.expose_custom_metrics("source1", [pods("metric1")]);
        provider.expose_external_metrics("source1", [ExternalMetricInfo::new("queue")]);
        registry.add_or_update_source(&descriptor("source1", 1)).await.unwrap();
        let before = registry.snapshot();

        for kind in [MetricKind::Custom, MetricKind::External] {
            provider.expose_custom_metrics("source1", [pods("metric2")]);
            provider.fail_discovery("source1", kind);

            let err = registry
                .add_or_update_source(&descriptor("source1", 99))
                .await
                .unwrap_err();
            assert_matches!(err, Error::Discovery { kind: k, .. } if k == kind);
            assert_eq!(registry.snapshot(), before);

            provider.restore_discovery("source1", kind);
        }
    }

    #[tokio::test]
    async fn test_every_update_builds_a_fresh_client() {
        let provider = Arc::new(InMemoryClientProvider::new());
        let registry = Registry::new(provider.clone());
        provider.expose_custom_metrics("source1", [pods("metric1")]);

        registry.add_or_update_source(&descriptor("source1", 1)).await.unwrap();
        registry.add_or_update_source(&descriptor("source1", 1)).await.unwrap();

        assert_eq!(provider.clients_built(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_not_found_and_inconsistency_are_distinct() {
        let registry = Registry::new(Arc::new(InMemoryClientProvider::new()));
        let err = registry.resolve_custom(&pods("metric1")).unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(err.http_status(), 404);
        assert_matches!(err, Error::MetricNotFound { kind: MetricKind::Custom, .. });
    }
}

// =============================================================================
// Concurrency
// =============================================================================

mod concurrency_tests {
    use super::*;
    use async_trait::async_trait;
    use metrics_router::domain::{
        ExternalMetricValueList, MetricValue, MetricValueList, MetricsClientProvider,
        NamespacedName,
    };
    use tokio::sync::Notify;

    /// Holds custom discovery of the source named `slow` until released.
    struct GatedProvider {
        inner: InMemoryClientProvider,
        gate: Arc<Notify>,
    }

    #[derive(Debug)]
    struct GatedClient {
        inner: Arc<dyn MetricsClient>,
        gate: Option<Arc<Notify>>,
    }

    impl MetricsClientProvider for GatedProvider {
        fn new_client(
            &self,
            descriptor: &SourceDescriptor,
        ) -> metrics_router::Result<Arc<dyn MetricsClient>> {
            let inner = self.inner.new_client(descriptor)?;
            let gate = (descriptor.name == "slow").then(|| self.gate.clone());
            Ok(Arc::new(GatedClient { inner, gate }))
        }
    }

    #[async_trait]
    impl MetricsClient for GatedClient {
        async fn list_custom_metric_infos(
            &self,
        ) -> metrics_router::Result<HashSet<CustomMetricInfo>> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.inner.list_custom_metric_infos().await
        }

        async fn list_external_metric_infos(
            &self,
        ) -> metrics_router::Result<HashSet<ExternalMetricInfo>> {
            self.inner.list_external_metric_infos().await
        }

        async fn get_metric_by_name(
            &self,
            name: &NamespacedName,
            info: &CustomMetricInfo,
            metric_selector: Option<&str>,
        ) -> metrics_router::Result<MetricValue> {
            self.inner.get_metric_by_name(name, info, metric_selector).await
        }

        async fn get_metric_by_selector(
            &self,
            namespace: &str,
            selector: Option<&str>,
            info: &CustomMetricInfo,
            metric_selector: Option<&str>,
        ) -> metrics_router::Result<MetricValueList> {
            self.inner
                .get_metric_by_selector(namespace, selector, info, metric_selector)
                .await
        }

        async fn get_external_metric(
            &self,
            namespace: &str,
            info: &ExternalMetricInfo,
            metric_selector: Option<&str>,
        ) -> metrics_router::Result<ExternalMetricValueList> {
            self.inner
                .get_external_metric(namespace, info, metric_selector)
                .await
        }

        fn backend(&self) -> &MetricsServiceBackend {
            self.inner.backend()
        }
    }

    #[tokio::test]
    async fn test_pending_discovery_does_not_block_resolution() {
        let gate = Arc::new(Notify::new());
        let inner = InMemoryClientProvider::new();
        inner.expose_custom_metrics("fast", [pods("metric1")]);
        inner.expose_custom_metrics("slow", [pods("metric1")]);
        let registry = Arc::new(Registry::new(Arc::new(GatedProvider {
            inner,
            gate: gate.clone(),
        })));

        registry.add_or_update_source(&descriptor("fast", 1)).await.unwrap();

        let pending = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.add_or_update_source(&descriptor("slow", 2)).await })
        };
        tokio::task::yield_now().await;

        assert!(!pending.is_finished());
        assert_eq!(winner(&registry, "metric1").as_deref(), Some("fast"));
        assert_eq!(registry.source_names(), vec!["fast"]);

        gate.notify_one();
        assert_eq!(pending.await.unwrap().unwrap(), 1);
        assert_eq!(winner(&registry, "metric1").as_deref(), Some("slow"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_keep_index_consistent() {
        let provider = Arc::new(InMemoryClientProvider::new());
        let registry = Arc::new(Registry::new(provider.clone()));
        let names = ["s0", "s1", "s2", "s3"];
        for (i, name) in names.iter().enumerate() {
            provider.expose_custom_metrics(name, (0..=i).map(|m| pods(&format!("m{}", m))));
        }

        let mut tasks = Vec::new();
        for round in 0..20 {
            for (i, name) in names.iter().enumerate() {
                let registry = registry.clone();
                let name = name.to_string();
                tasks.push(tokio::spawn(async move {
                    if (round + i) % 3 == 0 {
                        registry.delete_source(&name);
                    } else {
                        let _ = registry
                            .add_or_update_source(&descriptor(&name, (round % 5) as i32))
                            .await;
                    }
                    let _ = registry.resolve_custom(&pods("m0"));
                }));
            }
        }
        for task in tasks {
            task.await.unwrap();
        }

        let snapshot = registry.snapshot();
        for (info, ranked) in &snapshot.custom {
            assert!(!ranked.is_empty());
            for source in ranked {
                let record = &snapshot.sources[&source.name];
                assert!(record.custom_metrics.contains(info));
                assert_eq!(record.priority, source.priority);
            }
        }
        for source in snapshot.sources.values() {
            for info in &source.custom_metrics {
                assert!(snapshot.custom[info].iter().any(|s| s.name == source.name));
            }
        }
    }
}

// =============================================================================
// Metrics API
// =============================================================================

mod api_tests {
    use super::*;
    use metrics_router::server::{dispatch, parse_request};

    async fn routed() -> RoutedMetricsProvider {
        let backends = Arc::new(InMemoryClientProvider::new());
        backends.expose_custom_metrics("prometheus-adapter", [pods("http_requests")]);
        backends.expose_external_metrics("keda", [ExternalMetricInfo::new("queue_depth")]);
        backends.set_value("keda", "7");

        let registry = Arc::new(Registry::new(backends));
        registry
            .add_or_update_source(&descriptor("prometheus-adapter", 10))
            .await
            .unwrap();
        registry
            .add_or_update_source(&descriptor("keda", 5))
            .await
            .unwrap();
        RoutedMetricsProvider::new(registry)
    }

    async fn get(
        provider: &RoutedMetricsProvider,
        path: &str,
        query: Option<&str>,
    ) -> (u16, serde_json::Value) {
        let request = parse_request(path, query).expect("known path");
        dispatch(provider, request).await
    }

    #[tokio::test]
    async fn test_discovery_documents() {
        let provider = routed().await;

        let (status, body) = get(&provider, "/apis/custom.metrics.k8s.io/v1beta1", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["groupVersion"], "custom.metrics.k8s.io/v1beta1");
        assert_eq!(body["resources"][0]["name"], "pods/http_requests");

        let (status, body) = get(&provider, "/apis/external.metrics.k8s.io/v1beta1", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["resources"][0]["name"], "queue_depth");
    }

    #[tokio::test]
    async fn test_external_value_routed_to_backend() {
        let provider = routed().await;
        let (status, body) = get(
            &provider,
            "/apis/external.metrics.k8s.io/v1beta1/namespaces/default/queue_depth",
            Some("labelSelector=queue%3Dorders"),
        )
        .await;

        assert_eq!(status, 200);
        assert_eq!(body["kind"], "ExternalMetricValueList");
        assert_eq!(body["items"][0]["metricName"], "queue_depth");
        assert_eq!(body["items"][0]["value"], "7");
    }

    #[tokio::test]
    async fn test_selector_query() {
        let provider = routed().await;
        let (status, body) = get(
            &provider,
            "/apis/custom.metrics.k8s.io/v1beta2/namespaces/default/pods/*/http_requests",
            Some("labelSelector=app%3Dweb"),
        )
        .await;

        assert_eq!(status, 200);
        assert_eq!(body["items"][0]["metric"]["name"], "http_requests");
    }

    #[tokio::test]
    async fn test_unknown_metric_answers_status_404() {
        let provider = routed().await;
        let (status, body) = get(
            &provider,
            "/apis/custom.metrics.k8s.io/v1beta2/namespaces/default/pods/web-0/latency",
            None,
        )
        .await;

        assert_eq!(status, 404);
        assert_eq!(body["kind"], "Status");
        assert_eq!(body["reason"], "NotFound");
    }
}
