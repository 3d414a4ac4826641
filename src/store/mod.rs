//! Storage collaborators.
//!
//! [`MeasurementStore`] persists canonical measurements; [`SummaryStore`]
//! holds incrementally maintained bucket summaries.

mod csv;
mod memory;

pub use self::csv::CsvStore;
pub use self::memory::MemoryStore;

use anyhow::Result;

use crate::aggregate::{AggregateSummary, SummaryTable};
use crate::bucket::{BucketKey, GridResolution};
use crate::measurement::Measurement;

/// Append-only store of canonical measurements.
#[async_trait::async_trait]
pub trait MeasurementStore: Send + Sync {
    async fn append(&self, measurement: &Measurement) -> Result<()>;

    /// Every stored measurement, in no particular order.
    async fn scan_all(&self) -> Result<Vec<Measurement>>;

    /// The most recent measurement by timestamp.
    async fn latest(&self) -> Result<Option<Measurement>> {
        Ok(self
            .scan_all()
            .await?
            .into_iter()
            .max_by_key(|m| m.timestamp))
    }
}

/// Per-bucket summary storage for incremental maintenance.
pub trait SummaryStore: Send + Sync {
    /// Grid the stored bucket keys are built on.
    fn resolution(&self) -> GridResolution;

    fn get_summary(&self, key: &BucketKey) -> Option<AggregateSummary>;

    fn put_summary(&self, summary: AggregateSummary);

    /// Atomic read-modify-write of one bucket; concurrent calls for the same
    /// key are serialized.
    fn update_summary(
        &self,
        key: &BucketKey,
        f: &mut dyn FnMut(Option<AggregateSummary>) -> Option<AggregateSummary>,
    ) -> Option<AggregateSummary>;

    fn summaries(&self) -> Vec<AggregateSummary>;
}

impl SummaryStore for SummaryTable {
    fn resolution(&self) -> GridResolution {
        SummaryTable::resolution(self)
    }

    fn get_summary(&self, key: &BucketKey) -> Option<AggregateSummary> {
        self.get(key)
    }

    fn put_summary(&self, summary: AggregateSummary) {
        self.insert(summary);
    }

    fn update_summary(
        &self,
        key: &BucketKey,
        f: &mut dyn FnMut(Option<AggregateSummary>) -> Option<AggregateSummary>,
    ) -> Option<AggregateSummary> {
        self.update(key, f)
    }

    fn summaries(&self) -> Vec<AggregateSummary> {
        self.snapshot()
    }
}
