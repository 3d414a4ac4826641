//! Raw submissions as they arrive from clients and the canonical
//! [`Measurement`] record they are normalized into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Both components are finite and inside [-90, 90] / [-180, 180].
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// One submission exactly as a client posted it.
///
/// Two client shapes are accepted: the flat speed-test shape
/// (`downloadSpeed`, `uploadSpeed`, `ping`, `latitude`, `longitude`, `ip`) and
/// the sensor shape (`downloadMbps`, `uploadMbps`, `pingMs`, a GeoJSON
/// `location` point `{"type": "Point", "coordinates": [lon, lat]}`, plus
/// auxiliary fields). Numeric fields may be JSON numbers or numeric strings.
/// Anything not recognized lands in `extra`.
///
/// Every known field is kept as an untyped [`Value`] so any JSON object
/// decodes; type checks happen during normalization, where a bad field
/// rejects only its own submission.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSubmission {
    #[serde(default, alias = "downloadSpeed")]
    pub download_mbps: Option<Value>,
    #[serde(default, alias = "uploadSpeed")]
    pub upload_mbps: Option<Value>,
    #[serde(default, alias = "ping")]
    pub ping_ms: Option<Value>,
    #[serde(default)]
    pub latitude: Option<Value>,
    #[serde(default)]
    pub longitude: Option<Value>,
    #[serde(default)]
    pub location: Option<Value>,
    #[serde(default)]
    pub provider: Option<Value>,
    #[serde(default)]
    pub ip: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Canonical, validated measurement. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub provider: String,
    pub latitude: f64,
    pub longitude: f64,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: Option<f64>,
    pub timestamp: DateTime<Utc>,
    /// Auxiliary sensor data (jitter, signal strength, cell/wifi scans).
    /// Carried along for other consumers; aggregation never reads it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Value>,
}

impl Measurement {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// Reads a JSON number or a numeric string as a finite `f64`.
pub(crate) fn number_field(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}
