//! Filtering and trend derivation over bucket summaries.
//!
//! Everything here is a pure computation over summaries that were already
//! fetched, so a caller can drop a query at any point.

pub mod filter;
pub mod series;
pub mod view;

pub use filter::{ALL, FilterQuery, FilterSpec, filter, sort_chronologically};
pub use series::{
    CellRollup, Facets, ProviderRollup, TrendPoint, cell_rollup, facets, provider_rollup,
    trend_series,
};
pub use view::{
    LocationView, MapPointView, MetricsView, PingPointView, ProviderTestsView, SpeedPointView,
    SummaryView, TimeBucketView, round_to,
};
