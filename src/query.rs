//! Query side: produce bucket summaries and serve filtered views of them.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::aggregate::{AggregateSummary, recompute};
use crate::bucket::GridResolution;
use crate::measurement::Measurement;
use crate::output::measurements_geojson;
use crate::services::{Describer, label_location};
use crate::store::{MeasurementStore, SummaryStore};
use crate::trends::{
    Facets, FilterSpec, MapPointView, PingPointView, ProviderTestsView, SpeedPointView,
    SummaryView, cell_rollup, facets, filter, provider_rollup, sort_chronologically, trend_series,
};

/// Everything a trend dashboard needs for one filter selection.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendReport {
    pub speed: Vec<SpeedPointView>,
    pub ping: Vec<PingPointView>,
    pub providers: Vec<ProviderTestsView>,
    pub facets: Facets,
}

pub struct QueryEngine<S> {
    store: Arc<S>,
    summaries: Option<Arc<dyn SummaryStore>>,
    resolution: GridResolution,
}

impl<S: MeasurementStore> QueryEngine<S> {
    /// Recompute-on-read engine: every query scans the whole store.
    pub fn new(store: Arc<S>, resolution: GridResolution) -> Self {
        Self {
            store,
            summaries: None,
            resolution,
        }
    }

    /// Serves summaries maintained incrementally instead of rescanning.
    pub fn with_summaries(mut self, summaries: Arc<dyn SummaryStore>) -> Self {
        self.resolution = summaries.resolution();
        self.summaries = Some(summaries);
        self
    }

    /// Current summary of every bucket, unfiltered and unordered.
    #[tracing::instrument(skip(self))]
    pub async fn summaries(&self) -> Result<Vec<AggregateSummary>> {
        if let Some(table) = &self.summaries {
            let summaries = table.summaries();
            debug!(buckets = summaries.len(), "Serving maintained summaries");
            return Ok(summaries);
        }

        let measurements = self.store.scan_all().await?;
        let set = recompute(&measurements, self.resolution, Utc::now());
        Ok(set.into_values().collect())
    }

    async fn selected(&self, spec: &FilterSpec) -> Result<Vec<AggregateSummary>> {
        let all = self.summaries().await?;
        let mut selected = filter(&all, spec);
        sort_chronologically(&mut selected);
        debug!(total = all.len(), selected = selected.len(), ?spec, "Applied filter");
        Ok(selected)
    }

    /// Bucket views matching `spec`, ordered by date, hour, provider, cell.
    pub async fn query(&self, spec: &FilterSpec) -> Result<Vec<SummaryView>> {
        let selected = self.selected(spec).await?;
        Ok(selected.iter().map(SummaryView::from).collect())
    }

    pub async fn trends(&self, spec: &FilterSpec) -> Result<TrendReport> {
        let selected = self.selected(spec).await?;
        let series = trend_series(&selected);

        let report = TrendReport {
            speed: series.iter().map(SpeedPointView::from).collect(),
            ping: series.iter().filter_map(PingPointView::from_point).collect(),
            providers: provider_rollup(&selected)
                .iter()
                .map(ProviderTestsView::from)
                .collect(),
            facets: facets(&selected),
        };
        info!(
            points = report.speed.len(),
            providers = report.providers.len(),
            "Trend report built"
        );
        Ok(report)
    }

    /// One marker per grid cell. With a `describer`, each marker gets a place
    /// name (or its coordinate label when the lookup fails).
    pub async fn map<D>(&self, spec: &FilterSpec, describer: Option<&D>) -> Result<Vec<MapPointView>>
    where
        D: Describer + ?Sized,
    {
        let selected = self.selected(spec).await?;
        let mut points = Vec::new();
        for cell in cell_rollup(&selected) {
            let mut view = MapPointView::from(&cell);
            if let Some(describer) = describer {
                let name =
                    label_location(describer, cell.cell.lat_bucket(), cell.cell.lon_bucket()).await;
                view.location_name = Some(name);
            }
            points.push(view);
        }
        Ok(points)
    }

    pub async fn latest(&self) -> Result<Option<Measurement>> {
        self.store.latest().await
    }

    /// Every stored measurement as a GeoJSON FeatureCollection.
    pub async fn geojson(&self) -> Result<Value> {
        let measurements = self.store.scan_all().await?;
        Ok(measurements_geojson(&measurements))
    }
}
