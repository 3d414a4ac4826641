//! Validation and canonicalization of raw submissions.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ValidationError;
use crate::measurement::{Coordinates, Measurement, RawSubmission, number_field};
use crate::services::Locator;

/// Provider label used when neither a provider nor a client address is known.
pub const UNKNOWN_PROVIDER: &str = "unknown";

/// Turns [`RawSubmission`]s into [`Measurement`]s.
///
/// Submissions without coordinates are placed with the [`Locator`]; that call
/// is bounded by `lookup_timeout` and never retried.
pub struct Normalizer<L> {
    locator: L,
    lookup_timeout: Duration,
}

impl<L: Locator> Normalizer<L> {
    pub fn new(locator: L, lookup_timeout: Duration) -> Self {
        Self {
            locator,
            lookup_timeout,
        }
    }

    pub fn locator(&self) -> &L {
        &self.locator
    }

    /// Validates `raw` and produces the canonical record.
    ///
    /// `client_addr` is the network address the transport saw; the
    /// submission's own `ip` field is used when it is absent.
    #[tracing::instrument(skip(self, raw, received_at))]
    pub async fn normalize(
        &self,
        raw: RawSubmission,
        client_addr: Option<&str>,
        received_at: DateTime<Utc>,
    ) -> Result<Measurement, ValidationError> {
        let download = non_negative(raw.download_mbps.as_ref());
        let upload = non_negative(raw.upload_mbps.as_ref());

        let (download_mbps, upload_mbps) = match (download, upload) {
            (Some(d), Some(u)) => (d, u),
            (d, u) => {
                let mut missing = Vec::new();
                if d.is_none() {
                    missing.push("downloadMbps");
                }
                if u.is_none() {
                    missing.push("uploadMbps");
                }
                return Err(ValidationError::MissingFields(missing.join(", ")));
            }
        };

        let ping_ms = match raw.ping_ms.as_ref() {
            None | Some(Value::Null) => None,
            Some(v) => {
                let ping = non_negative(Some(v));
                if ping.is_none() {
                    debug!(ping = %v, "Ignoring unusable ping value");
                }
                ping
            }
        };

        let submitted_provider = text_field(raw.provider.as_ref(), "provider")?;
        let submitted_ip = text_field(raw.ip.as_ref(), "ip")?;
        let timestamp = timestamp_field(raw.timestamp.as_ref())?;

        let address = client_addr
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .or(submitted_ip);

        let coordinates = match submitted_coordinates(&raw) {
            Some(c) if c.is_valid() => c,
            Some(c) => {
                return Err(ValidationError::InvalidCoordinates {
                    latitude: c.latitude.to_string(),
                    longitude: c.longitude.to_string(),
                });
            }
            None => self.locate(address.as_deref()).await?,
        };

        let provider = submitted_provider
            .or(address)
            .unwrap_or_else(|| UNKNOWN_PROVIDER.to_string());

        let attachment = (!raw.extra.is_empty()).then(|| Value::Object(raw.extra));

        Ok(Measurement {
            provider,
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
            download_mbps,
            upload_mbps,
            ping_ms,
            timestamp: timestamp.unwrap_or(received_at),
            attachment,
        })
    }

    async fn locate(&self, address: Option<&str>) -> Result<Coordinates, ValidationError> {
        let Some(address) = address else {
            debug!("No coordinates and no client address");
            return Err(ValidationError::UnresolvedLocation);
        };

        match tokio::time::timeout(self.lookup_timeout, self.locator.resolve(address)).await {
            Ok(Ok(c)) if c.is_valid() => {
                debug!(address, latitude = c.latitude, longitude = c.longitude, "Location resolved");
                Ok(c)
            }
            Ok(Ok(c)) => {
                warn!(
                    address,
                    latitude = c.latitude,
                    longitude = c.longitude,
                    "Locator returned out-of-range coordinates"
                );
                Err(ValidationError::UnresolvedLocation)
            }
            Ok(Err(e)) => {
                warn!(address, error = %e, "Location lookup failed");
                Err(ValidationError::UnresolvedLocation)
            }
            Err(_) => {
                warn!(
                    address,
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "Location lookup timed out"
                );
                Err(ValidationError::UnresolvedLocation)
            }
        }
    }
}

fn non_negative(value: Option<&Value>) -> Option<f64> {
    value.and_then(number_field).filter(|v| *v >= 0.0)
}

/// Trimmed string value; absent, null, and blank all read as `None`.
fn text_field(value: Option<&Value>, field: &str) -> Result<Option<String>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string()).filter(|s| !s.is_empty())),
        Some(other) => Err(ValidationError::InvalidField(format!(
            "{field}: expected a string, got {other}"
        ))),
    }
}

/// RFC 3339 instant, converted to UTC.
fn timestamp_field(value: Option<&Value>) -> Result<Option<DateTime<Utc>>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s.trim())
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| ValidationError::InvalidField(format!("timestamp {s:?}: {e}"))),
        Some(other) => Err(ValidationError::InvalidField(format!(
            "timestamp: expected an RFC 3339 string, got {other}"
        ))),
    }
}

/// Coordinates carried by the submission itself: flat `latitude`/`longitude`
/// first, then a GeoJSON `location` point (`[lon, lat]`).
fn submitted_coordinates(raw: &RawSubmission) -> Option<Coordinates> {
    let flat = raw
        .latitude
        .as_ref()
        .and_then(number_field)
        .zip(raw.longitude.as_ref().and_then(number_field));
    if let Some((latitude, longitude)) = flat {
        return Some(Coordinates::new(latitude, longitude));
    }

    let point = raw.location.as_ref()?.get("coordinates")?.as_array()?;
    match point.as_slice() {
        [lon, lat] => Some(Coordinates::new(number_field(lat)?, number_field(lon)?)),
        _ => None,
    }
}
