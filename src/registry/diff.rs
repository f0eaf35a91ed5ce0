//! Diff of a source's discovered metric sets

use std::collections::HashSet;
use std::hash::Hash;

/// Metrics present in `previous` but no longer in `current`.
pub fn removed_metrics<'a, M>(previous: &'a HashSet<M>, current: &'a HashSet<M>) -> Vec<&'a M>
where
    M: Eq + Hash,
{
    previous.difference(current).collect()
}
