//! Traits for the location collaborators used during ingestion and display.

use anyhow::Result;
use tracing::warn;

use crate::measurement::Coordinates;

/// Resolves a client network address to approximate coordinates.
#[async_trait::async_trait]
pub trait Locator: Send + Sync {
    /// Returns the coordinates for `address`, or an error when the lookup
    /// failed or produced no position.
    async fn resolve(&self, address: &str) -> Result<Coordinates>;
}

/// Turns coordinates into a human-readable place name.
#[async_trait::async_trait]
pub trait Describer: Send + Sync {
    async fn describe(&self, latitude: f64, longitude: f64) -> Result<String>;
}

/// Numeric label used whenever a place name is unavailable.
pub fn coordinate_label(latitude: f64, longitude: f64) -> String {
    format!("{latitude:.4}, {longitude:.4}")
}

/// Best-effort place name: falls back to [`coordinate_label`] on any failure.
pub async fn label_location<D: Describer + ?Sized>(
    describer: &D,
    latitude: f64,
    longitude: f64,
) -> String {
    match describer.describe(latitude, longitude).await {
        Ok(name) if !name.trim().is_empty() => name,
        Ok(_) => coordinate_label(latitude, longitude),
        Err(e) => {
            warn!(latitude, longitude, error = %e, "Reverse lookup failed, using coordinates");
            coordinate_label(latitude, longitude)
        }
    }
}
