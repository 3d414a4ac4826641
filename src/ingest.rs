//! Ingestion: normalize, persist, and (optionally) fold into live summaries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregate::{AggregateSummary, Metrics};
use crate::bucket::{GridResolution, bucket_key};
use crate::error::IngestError;
use crate::measurement::{Measurement, RawSubmission};
use crate::normalize::Normalizer;
use crate::parser::ParsedSubmission;
use crate::services::Locator;
use crate::store::{MeasurementStore, SummaryStore};

/// Outcome of a batch ingestion.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub accepted: usize,
    pub rejected: Vec<Rejection>,
}

#[derive(Debug, Serialize)]
pub struct Rejection {
    pub index: usize,
    pub reason: String,
}

pub struct Ingestor<S, L> {
    normalizer: Normalizer<L>,
    store: Arc<S>,
    summaries: Option<Arc<dyn SummaryStore>>,
    resolution: GridResolution,
}

impl<S: MeasurementStore, L: Locator> Ingestor<S, L> {
    pub fn new(normalizer: Normalizer<L>, store: Arc<S>, resolution: GridResolution) -> Self {
        Self {
            normalizer,
            store,
            summaries: None,
            resolution,
        }
    }

    /// Keeps `summaries` up to date with every accepted measurement.
    ///
    /// Buckets are keyed on the grid of `summaries` from then on.
    pub fn with_summaries(mut self, summaries: Arc<dyn SummaryStore>) -> Self {
        if summaries.resolution() != self.resolution {
            warn!(
                ingestor = self.resolution.decimals(),
                summaries = summaries.resolution().decimals(),
                "Grid resolution differs from the summary store, using the store's"
            );
            self.resolution = summaries.resolution();
        }
        self.summaries = Some(summaries);
        self
    }

    pub async fn ingest(
        &self,
        raw: RawSubmission,
        client_addr: Option<&str>,
    ) -> Result<Measurement, IngestError> {
        self.ingest_at(raw, client_addr, Utc::now()).await
    }

    /// Ingests one submission received at `received_at`.
    ///
    /// Nothing is stored for a rejected submission, and the summary fold only
    /// happens after the store accepted the write.
    #[tracing::instrument(skip(self, raw, received_at))]
    pub async fn ingest_at(
        &self,
        raw: RawSubmission,
        client_addr: Option<&str>,
        received_at: DateTime<Utc>,
    ) -> Result<Measurement, IngestError> {
        let measurement = self
            .normalizer
            .normalize(raw, client_addr, received_at)
            .await?;

        self.store
            .append(&measurement)
            .await
            .map_err(IngestError::Storage)?;

        if let Some(summaries) = &self.summaries {
            let key = bucket_key(&measurement, self.resolution);
            let updated = summaries.update_summary(&key, &mut |current| {
                Some(match current {
                    Some(mut s) => {
                        s.metrics.fold(&measurement, received_at);
                        s
                    }
                    None => AggregateSummary {
                        key: key.clone(),
                        metrics: Metrics::from_measurement(&measurement, received_at),
                    },
                })
            });
            if let Some(s) = updated {
                debug!(
                    provider = %key.provider,
                    location = %key.cell,
                    total_tests = s.metrics.total_tests,
                    "Bucket summary updated"
                );
            }
        }

        Ok(measurement)
    }

    /// Ingests submissions in order, collecting per-item rejections.
    ///
    /// Stops at the first storage failure, since later writes would fail the
    /// same way.
    pub async fn ingest_batch(
        &self,
        batch: Vec<RawSubmission>,
        client_addr: Option<&str>,
    ) -> Result<IngestReport, IngestError> {
        self.ingest_parsed(batch.into_iter().map(Ok).collect(), client_addr)
            .await
    }

    /// Like [`ingest_batch`](Self::ingest_batch), for a decoded batch whose
    /// undecodable entries are already errors. Those are reported as
    /// rejections at their position.
    pub async fn ingest_parsed(
        &self,
        batch: Vec<ParsedSubmission>,
        client_addr: Option<&str>,
    ) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport::default();

        for (index, entry) in batch.into_iter().enumerate() {
            let outcome = match entry {
                Ok(raw) => self.ingest(raw, client_addr).await,
                Err(e) => Err(IngestError::Validation(e)),
            };
            match outcome {
                Ok(_) => report.accepted += 1,
                Err(IngestError::Validation(e)) => {
                    warn!(index, reason = %e, "Submission rejected");
                    report.rejected.push(Rejection {
                        index,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            accepted = report.accepted,
            rejected = report.rejected.len(),
            "Batch ingested"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::SummaryTable;
    use crate::error::ValidationError;
    use crate::measurement::Coordinates;
    use crate::store::MemoryStore;
    use anyhow::Result;
    use chrono::TimeZone;
    use serde_json::json;
    use std::time::Duration;

    struct FixedLocator(Option<Coordinates>);

    #[async_trait::async_trait]
    impl Locator for FixedLocator {
        async fn resolve(&self, _address: &str) -> Result<Coordinates> {
            self.0.ok_or_else(|| anyhow::anyhow!("unreachable"))
        }
    }

    struct BrokenStore;

    #[async_trait::async_trait]
    impl MeasurementStore for BrokenStore {
        async fn append(&self, _measurement: &Measurement) -> Result<()> {
            Err(anyhow::anyhow!("disk full"))
        }

        async fn scan_all(&self) -> Result<Vec<Measurement>> {
            Ok(Vec::new())
        }
    }

    fn raw(value: serde_json::Value) -> RawSubmission {
        serde_json::from_value(value).unwrap()
    }

    fn normalizer(answer: Option<Coordinates>) -> Normalizer<FixedLocator> {
        Normalizer::new(FixedLocator(answer), Duration::from_millis(100))
    }

    fn received() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 18, 5, 0).unwrap()
    }

    #[tokio::test]
    async fn test_rejected_submission_is_not_stored() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(normalizer(None), store.clone(), GridResolution::LEGACY);

        let err = ingestor
            .ingest(raw(json!({ "downloadMbps": 10, "latitude": 1, "longitude": 1 })), None)
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_incremental_summary_follows_ingestion() {
        let store = Arc::new(MemoryStore::new());
        let table = Arc::new(SummaryTable::new(GridResolution::LEGACY));
        let ingestor = Ingestor::new(
            normalizer(Some(Coordinates::new(28.6, 77.2))),
            store.clone(),
            GridResolution::LEGACY,
        )
        .with_summaries(table.clone());

        for down in [10.0, 20.0, 30.0] {
            ingestor
                .ingest_at(
                    raw(json!({ "downloadMbps": down, "uploadMbps": 5, "provider": "Jio" })),
                    Some("203.0.113.5"),
                    received(),
                )
                .await
                .unwrap();
        }

        assert_eq!(store.len(), 3);
        let summaries = table.snapshot();
        assert_eq!(summaries.len(), 1);
        let s = &summaries[0];
        assert_eq!(s.key.location_key(), "28.6,77.2");
        assert_eq!(s.key.hour, 18);
        assert_eq!(s.metrics.total_tests, 3);
        assert!((s.metrics.avg_download - 20.0).abs() < 1e-9);
        assert_eq!(s.metrics.last_updated, received());
    }

    #[tokio::test]
    async fn test_storage_failure_leaves_summaries_untouched() {
        let table = Arc::new(SummaryTable::new(GridResolution::LEGACY));
        let ingestor = Ingestor::new(normalizer(None), Arc::new(BrokenStore), GridResolution::LEGACY)
            .with_summaries(table.clone());

        let err = ingestor
            .ingest(
                raw(json!({ "downloadMbps": 10, "uploadMbps": 2, "latitude": 1, "longitude": 1 })),
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Storage(_)));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_batch_reports_rejections() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(normalizer(None), store.clone(), GridResolution::LEGACY);

        let report = ingestor
            .ingest_batch(
                vec![
                    raw(json!({ "downloadMbps": 1, "uploadMbps": 1, "latitude": 1, "longitude": 1 })),
                    raw(json!({ "downloadMbps": 1, "uploadMbps": 1 })),
                    raw(json!({ "uploadMbps": 1, "latitude": 1, "longitude": 1 })),
                ],
                Some("192.0.2.44"),
            )
            .await
            .unwrap();

        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected.len(), 2);
        assert_eq!(report.rejected[0].index, 1);
        assert_eq!(report.rejected[0].reason, ValidationError::UnresolvedLocation.to_string());
        assert_eq!(report.rejected[1].index, 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_bad_entries_do_not_sink_the_batch() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(normalizer(None), store.clone(), GridResolution::LEGACY);

        let batch = crate::parser::parse_submissions(
            br#"[
                {"downloadMbps": 5, "uploadMbps": 1, "latitude": 1, "longitude": 1, "timestamp": "2024-01-01"},
                {"downloadMbps": 6, "uploadMbps": 2, "latitude": 1, "longitude": 1, "provider": 42},
                "not a submission",
                {"downloadMbps": 7, "uploadMbps": 3, "latitude": 1, "longitude": 1, "provider": "Jio"}
            ]"#,
        )
        .unwrap();
        let report = ingestor.ingest_parsed(batch, None).await.unwrap();

        assert_eq!(report.accepted, 1);
        let rejected: Vec<_> = report.rejected.iter().map(|r| r.index).collect();
        assert_eq!(rejected, vec![0, 1, 2]);
        assert!(report.rejected[0].reason.contains("timestamp"));
        assert!(report.rejected[1].reason.contains("provider"));
        assert!(report.rejected[2].reason.starts_with("malformed submission"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_summaries_use_the_table_grid() {
        let store = Arc::new(MemoryStore::new());
        let table = Arc::new(SummaryTable::new(GridResolution::default()));
        let ingestor = Ingestor::new(normalizer(None), store, GridResolution::LEGACY)
            .with_summaries(table.clone());

        let m = ingestor
            .ingest_at(
                raw(json!({ "downloadMbps": 9, "uploadMbps": 3, "latitude": 12.971, "longitude": 77.594 })),
                None,
                received(),
            )
            .await
            .unwrap();

        assert_eq!(table.len(), 1);
        let key = bucket_key(&m, GridResolution::default());
        assert_eq!(table.get(&key).unwrap().metrics.total_tests, 1);
        assert_eq!(key.lat_bucket(), 12.97);
    }
}
