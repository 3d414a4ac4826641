//! Higher-level rollups derived from filtered bucket summaries.
//!
//! Every rollup re-combines bucket statistics with [`Metrics::merge`], so
//! each bucket counts in proportion to its `total_tests`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::aggregate::{AggregateSummary, Metrics};
use crate::bucket::GridCell;

/// One point of the per-provider time series.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub hour: u8,
    pub provider: String,
    pub metrics: Metrics,
}

/// Statistics of one provider across every selected bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRollup {
    pub provider: String,
    pub metrics: Metrics,
}

/// Statistics of one grid cell across providers and hours.
#[derive(Debug, Clone, PartialEq)]
pub struct CellRollup {
    pub cell: GridCell,
    pub metrics: Metrics,
}

/// Distinct values present in a summary set, for building selectors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Facets {
    pub providers: Vec<String>,
    pub locations: Vec<String>,
}

fn merge_into<K: Ord>(groups: &mut BTreeMap<K, Metrics>, key: K, metrics: &Metrics) {
    groups
        .entry(key)
        .and_modify(|acc| *acc = acc.merge(metrics))
        .or_insert_with(|| metrics.clone());
}

/// Regroups summaries by `(date, hour, provider)`, ascending by date and hour.
pub fn trend_series(summaries: &[AggregateSummary]) -> Vec<TrendPoint> {
    let mut groups: BTreeMap<(NaiveDate, u8, String), Metrics> = BTreeMap::new();
    for s in summaries {
        let key = (s.key.date, s.key.hour, s.key.provider.clone());
        merge_into(&mut groups, key, &s.metrics);
    }

    groups
        .into_iter()
        .map(|((date, hour, provider), metrics)| TrendPoint {
            date,
            hour,
            provider,
            metrics,
        })
        .collect()
}

/// Total statistics per provider.
pub fn provider_rollup(summaries: &[AggregateSummary]) -> Vec<ProviderRollup> {
    let mut groups: BTreeMap<String, Metrics> = BTreeMap::new();
    for s in summaries {
        merge_into(&mut groups, s.key.provider.clone(), &s.metrics);
    }

    groups
        .into_iter()
        .map(|(provider, metrics)| ProviderRollup { provider, metrics })
        .collect()
}

/// Total statistics per grid cell, for map markers.
pub fn cell_rollup(summaries: &[AggregateSummary]) -> Vec<CellRollup> {
    let mut groups: BTreeMap<GridCell, Metrics> = BTreeMap::new();
    for s in summaries {
        merge_into(&mut groups, s.key.cell, &s.metrics);
    }

    groups
        .into_iter()
        .map(|(cell, metrics)| CellRollup { cell, metrics })
        .collect()
}

pub fn facets(summaries: &[AggregateSummary]) -> Facets {
    let providers: BTreeSet<&str> = summaries.iter().map(|s| s.key.provider.as_str()).collect();
    let cells: BTreeSet<GridCell> = summaries.iter().map(|s| s.key.cell).collect();

    Facets {
        providers: providers.into_iter().map(str::to_string).collect(),
        locations: cells.iter().map(GridCell::location_key).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::{BucketKey, GridResolution};
    use chrono::{DateTime, TimeZone, Utc};

    const DELTA: f64 = 1e-9;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn summary(
        day: u32,
        hour: u8,
        provider: &str,
        lat: f64,
        count: u64,
        avg_download: f64,
    ) -> AggregateSummary {
        AggregateSummary {
            key: BucketKey {
                provider: provider.to_string(),
                cell: GridCell::of(lat, 77.2, GridResolution::LEGACY),
                date: NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
                hour,
            },
            metrics: Metrics {
                total_tests: count,
                avg_download,
                avg_upload: avg_download / 4.0,
                min_download: avg_download,
                max_download: avg_download,
                min_upload: avg_download / 4.0,
                max_upload: avg_download / 4.0,
                ping_tests: 0,
                avg_ping: None,
                last_updated: at(),
            },
        }
    }

    #[test]
    fn test_trend_is_weighted_across_cells() {
        // Same provider and hour, two cells with unequal sample counts.
        let summaries = vec![
            summary(1, 9, "Jio", 28.6, 1, 10.0),
            summary(1, 9, "Jio", 19.1, 9, 20.0),
        ];

        let series = trend_series(&summaries);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].metrics.total_tests, 10);
        assert!((series[0].metrics.avg_download - 19.0).abs() < DELTA);
    }

    #[test]
    fn test_trend_ordered_by_date_then_hour() {
        let summaries = vec![
            summary(2, 1, "Jio", 28.6, 1, 10.0),
            summary(1, 23, "Vi", 28.6, 1, 10.0),
            summary(1, 5, "Jio", 28.6, 1, 10.0),
            summary(1, 5, "Airtel", 28.6, 1, 10.0),
        ];

        let order: Vec<_> = trend_series(&summaries)
            .into_iter()
            .map(|p| (p.date.format("%d").to_string(), p.hour, p.provider))
            .collect();
        assert_eq!(
            order,
            vec![
                ("01".to_string(), 5, "Airtel".to_string()),
                ("01".to_string(), 5, "Jio".to_string()),
                ("01".to_string(), 23, "Vi".to_string()),
                ("02".to_string(), 1, "Jio".to_string()),
            ]
        );
    }

    #[test]
    fn test_provider_rollup_sums_tests() {
        let summaries = vec![
            summary(1, 1, "Jio", 28.6, 4, 10.0),
            summary(2, 3, "Jio", 19.1, 6, 30.0),
            summary(1, 1, "Vi", 28.6, 2, 5.0),
        ];

        let rollup = provider_rollup(&summaries);
        assert_eq!(rollup.len(), 2);
        let jio = rollup.iter().find(|r| r.provider == "Jio").unwrap();
        assert_eq!(jio.metrics.total_tests, 10);
        assert!((jio.metrics.avg_download - 22.0).abs() < DELTA);
        let vi = rollup.iter().find(|r| r.provider == "Vi").unwrap();
        assert_eq!(vi.metrics.total_tests, 2);
    }

    #[test]
    fn test_cell_rollup_merges_providers() {
        let summaries = vec![
            summary(1, 1, "Jio", 28.6, 3, 10.0),
            summary(1, 2, "Vi", 28.6, 1, 50.0),
            summary(1, 1, "Jio", 19.1, 1, 5.0),
        ];

        let cells = cell_rollup(&summaries);
        assert_eq!(cells.len(), 2);
        let delhi = cells.iter().find(|c| c.cell.location_key() == "28.6,77.2").unwrap();
        assert_eq!(delhi.metrics.total_tests, 4);
        assert!((delhi.metrics.avg_download - 20.0).abs() < DELTA);
        assert_eq!(delhi.metrics.max_download, 50.0);
    }

    #[test]
    fn test_facets_are_distinct_and_sorted() {
        let summaries = vec![
            summary(1, 1, "Vi", 28.6, 1, 1.0),
            summary(2, 1, "Jio", 28.6, 1, 1.0),
            summary(1, 1, "Jio", 19.1, 1, 1.0),
        ];

        let f = facets(&summaries);
        assert_eq!(f.providers, vec!["Jio", "Vi"]);
        assert_eq!(f.locations, vec!["19.1,77.2", "28.6,77.2"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(trend_series(&[]).is_empty());
        assert!(provider_rollup(&[]).is_empty());
        assert!(cell_rollup(&[]).is_empty());
        assert_eq!(facets(&[]), Facets::default());
    }
}
