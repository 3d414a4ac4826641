//! Building bucket summaries from measurements, either by a full scan or
//! incrementally one measurement at a time.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::aggregate::summary::{AggregateSummary, Metrics};
use crate::bucket::{BucketKey, GridResolution, bucket_key};
use crate::measurement::Measurement;

/// Summaries keyed by bucket.
pub type SummarySet = HashMap<BucketKey, AggregateSummary>;

/// Groups every measurement by bucket and folds each group.
///
/// One pass over the input; memory grows with the number of distinct buckets.
pub fn recompute<'a, I>(measurements: I, resolution: GridResolution, at: DateTime<Utc>) -> SummarySet
where
    I: IntoIterator<Item = &'a Measurement>,
{
    let mut buckets: SummarySet = HashMap::new();
    let mut folded = 0usize;

    for m in measurements {
        let key = bucket_key(m, resolution);
        buckets
            .entry(key)
            .and_modify(|s| s.metrics.fold(m, at))
            .or_insert_with_key(|key| AggregateSummary {
                key: key.clone(),
                metrics: Metrics::from_measurement(m, at),
            });
        folded += 1;
    }

    debug!(measurements = folded, buckets = buckets.len(), "Recomputed bucket summaries");
    buckets
}

/// Merges summary sets built from disjoint slices of the measurement set.
pub fn merge_sets<I>(sets: I) -> SummarySet
where
    I: IntoIterator<Item = SummarySet>,
{
    let mut merged: SummarySet = HashMap::new();
    for set in sets {
        for (key, summary) in set {
            merged
                .entry(key)
                .and_modify(|s| s.metrics = s.metrics.merge(&summary.metrics))
                .or_insert(summary);
        }
    }
    merged
}

/// Summaries maintained incrementally as measurements arrive.
///
/// Folds into the same bucket are serialized by the map's per-entry lock, so
/// concurrent ingestion never loses an update. Different buckets update in
/// parallel.
#[derive(Debug)]
pub struct SummaryTable {
    resolution: GridResolution,
    inner: DashMap<BucketKey, AggregateSummary>,
}

impl SummaryTable {
    pub fn new(resolution: GridResolution) -> Self {
        Self {
            resolution,
            inner: DashMap::new(),
        }
    }

    /// Seeds a table from a full recomputation, e.g. at startup.
    pub fn from_set(resolution: GridResolution, set: SummarySet) -> Self {
        let table = Self::new(resolution);
        for (key, summary) in set {
            table.inner.insert(key, summary);
        }
        table
    }

    pub fn resolution(&self) -> GridResolution {
        self.resolution
    }

    /// Folds one measurement into its bucket and returns the updated summary.
    pub fn fold(&self, m: &Measurement, at: DateTime<Utc>) -> AggregateSummary {
        let key = bucket_key(m, self.resolution);
        let entry = self
            .inner
            .entry(key.clone())
            .and_modify(|s| s.metrics.fold(m, at))
            .or_insert_with(|| AggregateSummary {
                key,
                metrics: Metrics::from_measurement(m, at),
            });
        entry.value().clone()
    }

    pub fn get(&self, key: &BucketKey) -> Option<AggregateSummary> {
        self.inner.get(key).map(|s| s.value().clone())
    }

    pub fn insert(&self, summary: AggregateSummary) {
        self.inner.insert(summary.key.clone(), summary);
    }

    /// Applies `f` to the current summary of `key` while holding its entry lock.
    /// `f` returning `None` removes the entry.
    pub fn update<F>(&self, key: &BucketKey, f: F) -> Option<AggregateSummary>
    where
        F: FnOnce(Option<AggregateSummary>) -> Option<AggregateSummary>,
    {
        match self.inner.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                match f(Some(occupied.get().clone())) {
                    Some(next) => {
                        occupied.insert(next.clone());
                        Some(next)
                    }
                    None => {
                        occupied.remove();
                        None
                    }
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let next = f(None)?;
                vacant.insert(next.clone());
                Some(next)
            }
        }
    }

    /// Copy of every summary currently held.
    pub fn snapshot(&self) -> Vec<AggregateSummary> {
        self.inner.iter().map(|s| s.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
