//! Backend resolution: metric identifier to winning source's client

use std::hash::Hash;
use std::sync::Arc;

use tracing::debug;

use super::directory::{SourceDirectory, SourceRecord};
use super::index::MetricIndex;
use super::Registry;
use crate::domain::{CustomMetricInfo, ExternalMetricInfo, MetricInfo, MetricKind, MetricsClient};
use crate::error::{Error, Result};

/// Look `info` up in `index` and translate the winner through `directory`.
pub(crate) fn resolve_in<'a, M>(
    index: &MetricIndex<M>,
    directory: &'a SourceDirectory,
    info: &M,
    kind: MetricKind,
    metric: &str,
) -> Result<&'a SourceRecord>
where
    M: Eq + Hash + Clone,
{
    let not_found = || Error::MetricNotFound {
        kind,
        metric: metric.to_string(),
    };

    let winner = index
        .get(info)
        .and_then(|list| list.select_best())
        .ok_or_else(not_found)?;

    directory
        .get(&winner.name)
        .ok_or_else(|| Error::InconsistentRegistry {
            source_name: winner.name.clone(),
        })
}

impl Registry {
    /// Client of the highest ranked source exposing `info`.
    pub fn resolve(&self, info: &MetricInfo) -> Result<Arc<dyn MetricsClient>> {
        let kind = info.kind();
        let metric = info.metric_name();
        let result = {
            let state = self.state.read();
            let record = match info {
                MetricInfo::Custom(custom) => {
                    resolve_in(&state.custom, &state.directory, custom, kind, metric)
                }
                MetricInfo::External(external) => {
                    resolve_in(&state.external, &state.directory, external, kind, metric)
                }
            };
            record.map(|r| (r.name.clone(), Arc::clone(&r.client)))
        };

        if let Some(metrics) = &self.metrics {
            let outcome = match &result {
                Ok(_) => "success",
                Err(e) if e.is_not_found() => "not_found",
                Err(_) => "inconsistent",
            };
            metrics.record_resolution(kind, outcome);
        }

        let (source, client) = result?;
        debug!(
            metric = %info,
            source = %source,
            backend = %client.backend().url(),
            "Resolved metrics backend"
        );
        Ok(client)
    }

    pub fn resolve_custom(&self, info: &CustomMetricInfo) -> Result<Arc<dyn MetricsClient>> {
        self.resolve(&MetricInfo::Custom(info.clone()))
    }

    pub fn resolve_external(&self, info: &ExternalMetricInfo) -> Result<Arc<dyn MetricsClient>> {
        self.resolve(&MetricInfo::External(info.clone()))
    }
}
