//! CSV-backed measurement store, one file per UTC day.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::MeasurementStore;
use crate::measurement::Measurement;

/// Flat CSV row; the attachment is stored as a JSON string.
#[derive(Debug, Serialize, Deserialize)]
struct MeasurementRow {
    timestamp: DateTime<Utc>,
    provider: String,
    latitude: f64,
    longitude: f64,
    download_mbps: f64,
    upload_mbps: f64,
    ping_ms: Option<f64>,
    attachment: Option<String>,
}

impl MeasurementRow {
    fn from_measurement(m: &Measurement) -> Result<Self> {
        let attachment = m
            .attachment
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        Ok(Self {
            timestamp: m.timestamp,
            provider: m.provider.clone(),
            latitude: m.latitude,
            longitude: m.longitude,
            download_mbps: m.download_mbps,
            upload_mbps: m.upload_mbps,
            ping_ms: m.ping_ms,
            attachment,
        })
    }

    fn into_measurement(self) -> Result<Measurement> {
        let attachment = self
            .attachment
            .filter(|a| !a.is_empty())
            .map(|a| serde_json::from_str(&a))
            .transpose()?;
        Ok(Measurement {
            provider: self.provider,
            latitude: self.latitude,
            longitude: self.longitude,
            download_mbps: self.download_mbps,
            upload_mbps: self.upload_mbps,
            ping_ms: self.ping_ms,
            timestamp: self.timestamp,
            attachment,
        })
    }
}

/// Stores measurements under `{root}/date=YYYY-MM-DD.csv`.
pub struct CsvStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the file holding measurements taken on `date`.
    pub fn partition_path(&self, date: NaiveDate) -> PathBuf {
        self.root.join(format!("date={}.csv", date.format("%Y-%m-%d")))
    }

    fn partitions(&self) -> Result<Vec<PathBuf>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            let is_partition = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("date=") && n.ends_with(".csv"));
            if is_partition {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

/// Appends one row, writing the header first when the file is new or empty.
fn append_row(path: &Path, row: &MeasurementRow) -> Result<()> {
    let file = OpenOptions::new().append(true).create(true).open(path)?;
    let needs_header = file.metadata()?.len() == 0;
    debug!(path = %path.display(), needs_header, "Appending CSV record");

    let mut writer = WriterBuilder::new()
        .has_headers(needs_header)
        .from_writer(file);

    writer.serialize(row)?;
    writer.flush()?;

    Ok(())
}

fn read_rows(path: &Path) -> Result<Vec<Measurement>> {
    let file = File::open(path)?;
    let mut rdr = csv::Reader::from_reader(file);
    let mut rows = Vec::new();

    for result in rdr.deserialize() {
        let row: MeasurementRow =
            result.with_context(|| format!("malformed row in {}", path.display()))?;
        rows.push(row.into_measurement()?);
    }

    Ok(rows)
}

#[async_trait::async_trait]
impl MeasurementStore for CsvStore {
    #[tracing::instrument(skip(self, measurement), fields(root = %self.root.display()))]
    async fn append(&self, measurement: &Measurement) -> Result<()> {
        let row = MeasurementRow::from_measurement(measurement)?;
        let path = self.partition_path(measurement.timestamp.date_naive());

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("CSV store write lock poisoned"))?;
        fs::create_dir_all(&self.root)
            .with_context(|| format!("creating {}", self.root.display()))?;
        append_row(&path, &row).with_context(|| format!("appending to {}", path.display()))
    }

    #[tracing::instrument(skip(self), fields(root = %self.root.display()))]
    async fn scan_all(&self) -> Result<Vec<Measurement>> {
        let mut all = Vec::new();
        for path in self.partitions()? {
            all.extend(read_rows(&path)?);
        }
        debug!(measurements = all.len(), "Scanned CSV store");
        Ok(all)
    }
}
