//! Spatial grid and bucket-key derivation.
//!
//! Coordinates are snapped to a decimal-degree grid whose size is the
//! configurable [`GridResolution`]. Cells are kept as integer indices so two
//! keys built from the same input are bit-identical and hash the same.

use std::fmt;

use chrono::{NaiveDate, Timelike};
use serde::{Deserialize, Serialize};

use crate::measurement::Measurement;

/// Sub-cell precision used to absorb binary representation error before the
/// half-away-from-zero rounding step (e.g. `28.65 * 10 == 286.49999999999997`).
const SNAP: f64 = 1e6;

/// Number of decimal places a coordinate is rounded to.
///
/// `1` is roughly 11 km of latitude, `2` roughly 1.1 km, `3` roughly 110 m.
/// Longitude cells shrink towards the poles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub struct GridResolution(u8);

impl GridResolution {
    pub const MAX_DECIMALS: u8 = 6;

    /// One decimal place, the grid older deployments produced.
    pub const LEGACY: GridResolution = GridResolution(1);

    pub fn new(decimals: u8) -> anyhow::Result<Self> {
        if decimals > Self::MAX_DECIMALS {
            anyhow::bail!(
                "grid resolution of {decimals} decimals exceeds the maximum of {}",
                Self::MAX_DECIMALS
            );
        }
        Ok(Self(decimals))
    }

    pub fn decimals(&self) -> u8 {
        self.0
    }

    fn scale(&self) -> f64 {
        10f64.powi(self.0 as i32)
    }

    /// Maps a coordinate to its integer cell index.
    ///
    /// Rounding is half away from zero on the decimal value: `28.65 -> 28.7`,
    /// `-28.65 -> -28.7` at one decimal.
    pub fn cell(&self, coordinate: f64) -> i32 {
        let scaled = coordinate * self.scale();
        let snapped = (scaled * SNAP).round() / SNAP;
        snapped.round() as i32
    }

    /// The bucket coordinate a cell index stands for.
    pub fn coordinate(&self, cell: i32) -> f64 {
        cell as f64 / self.scale()
    }

    /// Rounds a coordinate to this grid.
    pub fn round(&self, coordinate: f64) -> f64 {
        self.coordinate(self.cell(coordinate))
    }
}

impl TryFrom<u8> for GridResolution {
    type Error = anyhow::Error;

    fn try_from(decimals: u8) -> anyhow::Result<Self> {
        Self::new(decimals)
    }
}

impl From<GridResolution> for u8 {
    fn from(resolution: GridResolution) -> u8 {
        resolution.0
    }
}

impl Default for GridResolution {
    fn default() -> Self {
        GridResolution(2)
    }
}

/// One grid cell: a rounded (latitude, longitude) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCell {
    pub lat_cell: i32,
    pub lon_cell: i32,
    pub resolution: GridResolution,
}

impl GridCell {
    pub fn of(latitude: f64, longitude: f64, resolution: GridResolution) -> Self {
        Self {
            lat_cell: resolution.cell(latitude),
            lon_cell: resolution.cell(longitude),
            resolution,
        }
    }

    pub fn lat_bucket(&self) -> f64 {
        self.resolution.coordinate(self.lat_cell)
    }

    pub fn lon_bucket(&self) -> f64 {
        self.resolution.coordinate(self.lon_cell)
    }

    /// `"{latBucket},{lonBucket}"`, the form location filters match against.
    pub fn location_key(&self) -> String {
        format!("{},{}", self.lat_bucket(), self.lon_bucket())
    }
}

impl fmt::Display for GridCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat_bucket(), self.lon_bucket())
    }
}

/// Grouping key for aggregation: provider, grid cell, UTC date and hour.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    pub provider: String,
    pub cell: GridCell,
    pub date: NaiveDate,
    /// Hour of day, 0-23, UTC.
    pub hour: u8,
}

impl BucketKey {
    pub fn lat_bucket(&self) -> f64 {
        self.cell.lat_bucket()
    }

    pub fn lon_bucket(&self) -> f64 {
        self.cell.lon_bucket()
    }

    pub fn location_key(&self) -> String {
        self.cell.location_key()
    }

    /// ISO `YYYY-MM-DD` form of the date.
    pub fn date_string(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

/// Derives the bucket a measurement belongs to. Pure and total.
pub fn bucket_key(m: &Measurement, resolution: GridResolution) -> BucketKey {
    BucketKey {
        provider: m.provider.clone(),
        cell: GridCell::of(m.latitude, m.longitude, resolution),
        date: m.timestamp.date_naive(),
        hour: m.timestamp.hour() as u8,
    }
}
