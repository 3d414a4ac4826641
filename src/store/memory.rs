use std::sync::RwLock;

use anyhow::Result;

use super::MeasurementStore;
use crate::measurement::Measurement;

/// In-process measurement store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    measurements: RwLock<Vec<Measurement>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_measurements(measurements: Vec<Measurement>) -> Self {
        Self {
            measurements: RwLock::new(measurements),
        }
    }

    pub fn len(&self) -> usize {
        self.measurements.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl MeasurementStore for MemoryStore {
    async fn append(&self, measurement: &Measurement) -> Result<()> {
        self.measurements
            .write()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?
            .push(measurement.clone());
        Ok(())
    }

    async fn scan_all(&self) -> Result<Vec<Measurement>> {
        Ok(self
            .measurements
            .read()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?
            .clone())
    }
}
