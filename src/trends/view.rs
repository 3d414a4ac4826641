//! External, serializable shapes of summaries and rollups.
//!
//! Rounding is applied here and nowhere earlier: statistics to two decimals in
//! summary views, one decimal in trend points.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::{AggregateSummary, Metrics};
use crate::bucket::GridCell;
use crate::trends::series::{CellRollup, ProviderRollup, TrendPoint};

/// Rounds half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: u8) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationView {
    pub lat_bucket: f64,
    pub lon_bucket: f64,
}

impl From<GridCell> for LocationView {
    fn from(cell: GridCell) -> Self {
        Self {
            lat_bucket: cell.lat_bucket(),
            lon_bucket: cell.lon_bucket(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeBucketView {
    pub date: String,
    pub hour: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsView {
    pub total_tests: u64,
    pub avg_download: f64,
    pub avg_upload: f64,
    pub min_download: f64,
    pub max_download: f64,
    pub min_upload: f64,
    pub max_upload: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_ping: Option<f64>,
}

impl From<&Metrics> for MetricsView {
    fn from(m: &Metrics) -> Self {
        Self {
            total_tests: m.total_tests,
            avg_download: round_to(m.avg_download, 2),
            avg_upload: round_to(m.avg_upload, 2),
            min_download: round_to(m.min_download, 2),
            max_download: round_to(m.max_download, 2),
            min_upload: round_to(m.min_upload, 2),
            max_upload: round_to(m.max_upload, 2),
            avg_ping: m.avg_ping.map(|p| round_to(p, 2)),
        }
    }
}

/// One bucket as returned by the query operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryView {
    pub provider: String,
    pub location: LocationView,
    pub time_bucket: TimeBucketView,
    pub metrics: MetricsView,
    pub last_updated: DateTime<Utc>,
}

impl From<&AggregateSummary> for SummaryView {
    fn from(s: &AggregateSummary) -> Self {
        Self {
            provider: s.key.provider.clone(),
            location: s.key.cell.into(),
            time_bucket: TimeBucketView {
                date: s.key.date_string(),
                hour: s.key.hour,
            },
            metrics: (&s.metrics).into(),
            last_updated: s.metrics.last_updated,
        }
    }
}

/// Speed time-series point, labelled `YYYY-MM-DD HH:00`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedPointView {
    pub id: String,
    pub datetime: String,
    pub provider: String,
    pub download_speed: f64,
    pub upload_speed: f64,
    pub total_tests: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingPointView {
    pub id: String,
    pub datetime: String,
    pub provider: String,
    pub ping: f64,
    pub ping_tests: u64,
}

fn point_id(p: &TrendPoint) -> String {
    format!("{}_{}_{}", p.date.format("%Y-%m-%d"), p.hour, p.provider)
}

fn point_datetime(p: &TrendPoint) -> String {
    format!("{} {:02}:00", p.date.format("%Y-%m-%d"), p.hour)
}

impl From<&TrendPoint> for SpeedPointView {
    fn from(p: &TrendPoint) -> Self {
        Self {
            id: point_id(p),
            datetime: point_datetime(p),
            provider: p.provider.clone(),
            download_speed: round_to(p.metrics.avg_download, 1),
            upload_speed: round_to(p.metrics.avg_upload, 1),
            total_tests: p.metrics.total_tests,
        }
    }
}

impl PingPointView {
    /// `None` for points where no measurement carried a ping.
    pub fn from_point(p: &TrendPoint) -> Option<Self> {
        let ping = p.metrics.avg_ping?;
        Some(Self {
            id: point_id(p),
            datetime: point_datetime(p),
            provider: p.provider.clone(),
            ping: round_to(ping, 1),
            ping_tests: p.metrics.ping_tests,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderTestsView {
    pub id: String,
    pub provider: String,
    pub tests: u64,
    pub avg_download: f64,
    pub avg_upload: f64,
}

impl From<&ProviderRollup> for ProviderTestsView {
    fn from(r: &ProviderRollup) -> Self {
        Self {
            id: format!("provider_{}", r.provider),
            provider: r.provider.clone(),
            tests: r.metrics.total_tests,
            avg_download: round_to(r.metrics.avg_download, 2),
            avg_upload: round_to(r.metrics.avg_upload, 2),
        }
    }
}

/// A map marker: one grid cell with its statistics and an optional place name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapPointView {
    pub location: LocationView,
    pub location_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
    pub metrics: MetricsView,
    pub last_updated: DateTime<Utc>,
}

impl From<&CellRollup> for MapPointView {
    fn from(c: &CellRollup) -> Self {
        Self {
            location: c.cell.into(),
            location_key: c.cell.location_key(),
            location_name: None,
            metrics: (&c.metrics).into(),
            last_updated: c.metrics.last_updated,
        }
    }
}
