//! Metric index: metric identifier to ranking list
//!
//! One index exists per metric kind. An entry exists only while at least
//! one source exposes the identifier.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use super::diff::removed_metrics;
use super::ranking::{RankingList, SourceRef};

/// Index of the sources exposing each metric identifier.
#[derive(Debug, Clone)]
pub struct MetricIndex<M> {
    entries: HashMap<M, RankingList>,
}

impl<M> Default for MetricIndex<M> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<M> MetricIndex<M>
where
    M: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `source` from its `previous` identifiers to its `current` ones.
    ///
    /// Every current identifier gets the source upserted, so a priority
    /// change is reflected even for identifiers the source already exposed.
    pub fn update(&mut self, source: &SourceRef, previous: &HashSet<M>, current: &HashSet<M>) {
        for removed in removed_metrics(previous, current) {
            self.remove_from_entry(removed, &source.name);
        }

        for info in current {
            self.entries
                .entry(info.clone())
                .or_default()
                .upsert(source.clone());
        }
    }

    /// Remove `source_name` from every ranking list, pruning empty entries.
    pub fn remove_source(&mut self, source_name: &str) {
        self.entries.retain(|_, list| !list.remove(source_name));
    }

    /// Snapshot of the indexed identifiers, in no particular order.
    pub fn list_all(&self) -> Vec<M> {
        self.entries.keys().cloned().collect()
    }

    pub fn get(&self, info: &M) -> Option<&RankingList> {
        self.entries.get(info)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&M, &RankingList)> {
        self.entries.iter()
    }

    fn remove_from_entry(&mut self, info: &M, source_name: &str) {
        if let Some(list) = self.entries.get_mut(info) {
            if list.remove(source_name) {
                self.entries.remove(info);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExternalMetricInfo;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn set(names: &[&str]) -> HashSet<ExternalMetricInfo> {
        names.iter().map(|n| ExternalMetricInfo::new(*n)).collect()
    }

    fn best(index: &MetricIndex<ExternalMetricInfo>, metric: &str) -> Option<String> {
        index
            .get(&ExternalMetricInfo::new(metric))
            .and_then(RankingList::select_best)
            .map(|s| s.name.clone())
    }

    fn sorted(index: &MetricIndex<ExternalMetricInfo>) -> Vec<String> {
        let mut all: Vec<String> = index.list_all().into_iter().map(|m| m.metric).collect();
        all.sort();
        all
    }

    #[test]
    fn test_update_adds_new_source() {
        let mut index = MetricIndex::new();
        index.update(
            &SourceRef::new("source1", 100),
            &set(&[]),
            &set(&["metric1", "metric2"]),
        );
        index.update(&SourceRef::new("source2", 200), &set(&[]), &set(&["metric2"]));

        assert_eq!(sorted(&index), vec!["metric1", "metric2"]);
        assert_eq!(best(&index, "metric1").as_deref(), Some("source1"));
        assert_eq!(best(&index, "metric2").as_deref(), Some("source2"));
    }

    #[test]
    fn test_update_drops_removed_metrics_and_prunes() {
        let mut index = MetricIndex::new();
        let previous = set(&["metric1", "metric2", "metric4"]);
        index.update(&SourceRef::new("source1", 100), &set(&[]), &previous);
        index.update(
            &SourceRef::new("source2", 200),
            &set(&[]),
            &set(&["metric2", "metric3"]),
        );

        index.update(
            &SourceRef::new("source1", 300),
            &previous,
            &set(&["metric1", "metric3"]),
        );

        assert_eq!(sorted(&index), vec!["metric1", "metric2", "metric3"]);
        assert_eq!(best(&index, "metric2").as_deref(), Some("source2"));
        assert_eq!(best(&index, "metric3").as_deref(), Some("source1"));
        assert!(best(&index, "metric4").is_none());
    }

    #[test]
    fn test_update_with_unchanged_set_is_idempotent() {
        let mut index = MetricIndex::new();
        let metrics = set(&["metric1", "metric2"]);
        index.update(&SourceRef::new("source1", 100), &set(&[]), &metrics);
        index.update(&SourceRef::new("source2", 100), &set(&[]), &metrics);
        let before = index.get(&ExternalMetricInfo::new("metric1")).cloned();

        index.update(&SourceRef::new("source1", 100), &metrics, &metrics);

        assert_eq!(index.get(&ExternalMetricInfo::new("metric1")).cloned(), before);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_remove_source_prunes_empty_entries() {
        let mut index = MetricIndex::new();
        index.update(
            &SourceRef::new("source1", 100),
            &set(&[]),
            &set(&["metric1", "metric2"]),
        );
        index.update(&SourceRef::new("source2", 200), &set(&[]), &set(&["metric2"]));

        index.remove_source("source1");

        assert_eq!(sorted(&index), vec!["metric2"]);
        assert!(!index
            .get(&ExternalMetricInfo::new("metric2"))
            .unwrap()
            .contains("source1"));
    }

    #[test]
    fn test_removing_missing_entry_does_not_create_it() {
        let mut index: MetricIndex<ExternalMetricInfo> = MetricIndex::new();
        index.update(&SourceRef::new("source1", 1), &set(&["ghost"]), &set(&[]));
        assert!(index.is_empty());
    }

    proptest! {
        /// A source is ranked for a metric iff the metric is in its current set.
        #[test]
        fn prop_membership_matches_current_sets(
            ops in prop::collection::vec(
                (0usize..4, -2i32..3, prop::collection::btree_set(0usize..6, 0..6), any::<bool>()),
                1..30,
            )
        ) {
            let sources = ["s0", "s1", "s2", "s3"];
            let metrics = ["m0", "m1", "m2", "m3", "m4", "m5"];
            let mut index = MetricIndex::new();
            let mut current: BTreeMap<&str, HashSet<ExternalMetricInfo>> = BTreeMap::new();

            for (src, priority, exposed, delete) in ops {
                let name = sources[src];
                if delete {
                    index.remove_source(name);
                    current.remove(name);
                } else {
                    let next: HashSet<ExternalMetricInfo> =
                        exposed.iter().map(|i| ExternalMetricInfo::new(metrics[*i])).collect();
                    let previous = current.remove(name).unwrap_or_default();
                    index.update(&SourceRef::new(name, priority), &previous, &next);
                    current.insert(name, next);
                }

                for metric in metrics {
                    let info = ExternalMetricInfo::new(metric);
                    let expected: HashSet<&str> = current
                        .iter()
                        .filter(|(_, set)| set.contains(&info))
                        .map(|(name, _)| *name)
                        .collect();
                    match index.get(&info) {
                        Some(list) => {
                            prop_assert!(!list.is_empty());
                            let ranked: HashSet<&str> =
                                list.iter().map(|s| s.name.as_str()).collect();
                            prop_assert_eq!(ranked.len(), list.len());
                            prop_assert_eq!(ranked, expected);
                        }
                        None => prop_assert!(expected.is_empty()),
                    }
                }
            }
        }
    }
}
