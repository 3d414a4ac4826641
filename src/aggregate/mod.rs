//! Bucket aggregation.
//!
//! [`Metrics`] holds the count/mean/min/max statistics and the weighted
//! merge that combines them. [`AggregateSummary`] ties a set of metrics to
//! its [`BucketKey`](crate::bucket::BucketKey). [`recompute`] rebuilds every
//! summary from scratch; [`SummaryTable`] maintains them as measurements
//! arrive. Both produce the same statistics for the same input.

pub mod summary;
pub mod table;

pub use summary::{AggregateSummary, Metrics};
pub use table::{SummarySet, SummaryTable, merge_sets, recompute};
