//! Per-bucket statistics and the fold/merge algebra over them.

use chrono::{DateTime, Utc};

use crate::bucket::{BucketKey, GridResolution, bucket_key};
use crate::error::KeyMismatch;
use crate::measurement::Measurement;

/// Accumulated statistics for some set of measurements, independent of which
/// bucket they belong to.
///
/// `merge` is commutative and associative (up to floating point), so any
/// partitioning of the input converges to the same result. Values are kept at
/// full precision; rounding happens only in the view layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_tests: u64,
    pub avg_download: f64,
    pub avg_upload: f64,
    pub min_download: f64,
    pub max_download: f64,
    pub min_upload: f64,
    pub max_upload: f64,
    /// Number of folded measurements that carried a ping.
    pub ping_tests: u64,
    /// Mean ping weighted by `ping_tests`; `None` when no measurement had one.
    pub avg_ping: Option<f64>,
    pub last_updated: DateTime<Utc>,
}

impl Metrics {
    /// Statistics of a single measurement.
    pub fn from_measurement(m: &Measurement, at: DateTime<Utc>) -> Self {
        Self {
            total_tests: 1,
            avg_download: m.download_mbps,
            avg_upload: m.upload_mbps,
            min_download: m.download_mbps,
            max_download: m.download_mbps,
            min_upload: m.upload_mbps,
            max_upload: m.upload_mbps,
            ping_tests: u64::from(m.ping_ms.is_some()),
            avg_ping: m.ping_ms,
            last_updated: at,
        }
    }

    /// Combines the statistics of two disjoint measurement sets.
    pub fn merge(&self, other: &Metrics) -> Metrics {
        let total_tests = self.total_tests + other.total_tests;

        let min_download = self.min_download.min(other.min_download);
        let max_download = self.max_download.max(other.max_download);
        let min_upload = self.min_upload.min(other.min_upload);
        let max_upload = self.max_upload.max(other.max_upload);

        // Clamped so rounding in the weighted sum never pushes the mean a ulp
        // outside [min, max].
        let avg_download = weighted_mean(
            self.avg_download,
            self.total_tests,
            other.avg_download,
            other.total_tests,
        )
        .clamp(min_download, max_download);
        let avg_upload = weighted_mean(
            self.avg_upload,
            self.total_tests,
            other.avg_upload,
            other.total_tests,
        )
        .clamp(min_upload, max_upload);

        let avg_ping = match (self.avg_ping, other.avg_ping) {
            (Some(a), Some(b)) => Some(weighted_mean(a, self.ping_tests, b, other.ping_tests)),
            (a, b) => a.or(b),
        };

        Metrics {
            total_tests,
            avg_download,
            avg_upload,
            min_download,
            max_download,
            min_upload,
            max_upload,
            ping_tests: self.ping_tests + other.ping_tests,
            avg_ping,
            last_updated: self.last_updated.max(other.last_updated),
        }
    }

    /// Folds one more measurement in. Same as merging with its singleton.
    pub fn fold(&mut self, m: &Measurement, at: DateTime<Utc>) {
        *self = self.merge(&Metrics::from_measurement(m, at));
    }
}

fn weighted_mean(a: f64, a_count: u64, b: f64, b_count: u64) -> f64 {
    let total = a_count + b_count;
    if total == 0 {
        return 0.0;
    }
    (a * a_count as f64 + b * b_count as f64) / total as f64
}

/// Statistics of every measurement that fell into one bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSummary {
    pub key: BucketKey,
    pub metrics: Metrics,
}

impl AggregateSummary {
    pub fn singleton(m: &Measurement, resolution: GridResolution, at: DateTime<Utc>) -> Self {
        Self {
            key: bucket_key(m, resolution),
            metrics: Metrics::from_measurement(m, at),
        }
    }

    /// Folds `m` into `summary`, or starts a new summary when there is none.
    ///
    /// Fails when `m` belongs to a different bucket than `summary`.
    pub fn fold(
        summary: Option<AggregateSummary>,
        m: &Measurement,
        resolution: GridResolution,
        at: DateTime<Utc>,
    ) -> Result<AggregateSummary, KeyMismatch> {
        let single = AggregateSummary::singleton(m, resolution, at);
        match summary {
            None => Ok(single),
            Some(s) => s.merge(&single),
        }
    }

    /// Merges two summaries of the same bucket.
    pub fn merge(&self, other: &AggregateSummary) -> Result<AggregateSummary, KeyMismatch> {
        if self.key != other.key {
            return Err(KeyMismatch {
                left: format!("{:?}", self.key),
                right: format!("{:?}", other.key),
            });
        }
        Ok(AggregateSummary {
            key: self.key.clone(),
            metrics: self.metrics.merge(&other.metrics),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const DELTA: f64 = 1e-9;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn measurement(down: f64, up: f64, ping: Option<f64>) -> Measurement {
        Measurement {
            provider: "BSNL".to_string(),
            latitude: 12.97,
            longitude: 77.59,
            download_mbps: down,
            upload_mbps: up,
            ping_ms: ping,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 10, 15, 0).unwrap(),
            attachment: None,
        }
    }

    fn metrics(count: u64, avg_download: f64) -> Metrics {
        Metrics {
            total_tests: count,
            avg_download,
            avg_upload: avg_download / 2.0,
            min_download: avg_download,
            max_download: avg_download,
            min_upload: avg_download / 2.0,
            max_upload: avg_download / 2.0,
            ping_tests: 0,
            avg_ping: None,
            last_updated: at(),
        }
    }

    fn assert_close(a: &Metrics, b: &Metrics) {
        assert_eq!(a.total_tests, b.total_tests);
        assert!((a.avg_download - b.avg_download).abs() < DELTA);
        assert!((a.avg_upload - b.avg_upload).abs() < DELTA);
        assert_eq!(a.min_download, b.min_download);
        assert_eq!(a.max_download, b.max_download);
        assert_eq!(a.min_upload, b.min_upload);
        assert_eq!(a.max_upload, b.max_upload);
        assert_eq!(a.ping_tests, b.ping_tests);
        match (a.avg_ping, b.avg_ping) {
            (Some(x), Some(y)) => assert!((x - y).abs() < DELTA),
            (x, y) => assert_eq!(x, y),
        }
        assert_eq!(a.last_updated, b.last_updated);
    }

    #[test]
    fn test_singleton() {
        let s = Metrics::from_measurement(&measurement(42.0, 8.5, Some(20.0)), at());
        assert_eq!(s.total_tests, 1);
        assert_eq!(s.avg_download, 42.0);
        assert_eq!(s.min_download, 42.0);
        assert_eq!(s.max_download, 42.0);
        assert_eq!(s.avg_upload, 8.5);
        assert_eq!(s.ping_tests, 1);
        assert_eq!(s.avg_ping, Some(20.0));
        assert_eq!(s.last_updated, at());
    }

    #[test]
    fn test_merge_is_weighted_not_naive() {
        let merged = metrics(1, 10.0).merge(&metrics(9, 20.0));
        assert_eq!(merged.total_tests, 10);
        assert!((merged.avg_download - 19.0).abs() < DELTA);
        assert!((merged.avg_upload - 9.5).abs() < DELTA);
        assert_eq!(merged.min_download, 10.0);
        assert_eq!(merged.max_download, 20.0);
    }

    #[test]
    fn test_merge_commutative_and_associative() {
        let a = Metrics::from_measurement(&measurement(12.3, 4.1, Some(31.0)), at());
        let mut b = metrics(7, 55.5);
        b.last_updated = at() + chrono::Duration::minutes(5);
        let mut c = metrics(3, 0.7);
        c.ping_tests = 3;
        c.avg_ping = Some(12.0);

        assert_close(&a.merge(&b), &b.merge(&a));
        assert_close(&a.merge(&b).merge(&c), &a.merge(&b.merge(&c)));
        assert_close(&c.merge(&a).merge(&b), &a.merge(&b).merge(&c));
    }

    #[test]
    fn test_fold_equals_partition_merge() {
        let samples: Vec<Measurement> = (0..20)
            .map(|i| {
                let ping = if i % 3 == 0 { None } else { Some(10.0 + i as f64) };
                measurement(5.0 + i as f64 * 3.7, 1.0 + (i % 7) as f64, ping)
            })
            .collect();

        let mut folded = Metrics::from_measurement(&samples[0], at());
        for m in &samples[1..] {
            folded.fold(m, at());
        }

        for split in [1, 7, 13, 19] {
            let (left, right) = samples.split_at(split);
            let part = |ms: &[Measurement]| {
                let mut acc = Metrics::from_measurement(&ms[0], at());
                for m in &ms[1..] {
                    acc.fold(m, at());
                }
                acc
            };
            assert_close(&part(left).merge(&part(right)), &folded);
        }
    }

    #[test]
    fn test_bounds_hold_for_repeated_values() {
        let m = measurement(0.1, 0.3, None);
        let mut acc = Metrics::from_measurement(&m, at());
        for _ in 0..50 {
            acc.fold(&m, at());
            assert!(acc.min_download <= acc.avg_download && acc.avg_download <= acc.max_download);
            assert!(acc.min_upload <= acc.avg_upload && acc.avg_upload <= acc.max_upload);
        }
        assert_eq!(acc.total_tests, 51);
    }

    #[test]
    fn test_ping_weighted_by_ping_tests_only() {
        let mut acc = Metrics::from_measurement(&measurement(10.0, 1.0, None), at());
        acc.fold(&measurement(10.0, 1.0, Some(30.0)), at());
        acc.fold(&measurement(10.0, 1.0, Some(10.0)), at());
        assert_eq!(acc.total_tests, 3);
        assert_eq!(acc.ping_tests, 2);
        assert_eq!(acc.avg_ping, Some(20.0));
    }

    #[test]
    fn test_summary_fold_from_nothing() {
        let m = measurement(25.0, 5.0, None);
        let s = AggregateSummary::fold(None, &m, GridResolution::LEGACY, at()).unwrap();
        assert_eq!(s.metrics.total_tests, 1);
        assert_eq!(s.key.lat_bucket(), 13.0);

        let s = AggregateSummary::fold(Some(s), &m, GridResolution::LEGACY, at()).unwrap();
        assert_eq!(s.metrics.total_tests, 2);
    }

    #[test]
    fn test_summary_merge_rejects_different_keys() {
        let a = AggregateSummary::singleton(&measurement(1.0, 1.0, None), GridResolution::LEGACY, at());
        let mut other = measurement(1.0, 1.0, None);
        other.provider = "Jio".to_string();
        let b = AggregateSummary::singleton(&other, GridResolution::LEGACY, at());

        assert!(a.merge(&b).is_err());
        assert!(AggregateSummary::fold(Some(a), &other, GridResolution::LEGACY, at()).is_err());
    }
}
