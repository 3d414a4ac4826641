//! Output formatting: JSON printing and GeoJSON export of measurements.

use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::io::Write;

use crate::measurement::Measurement;

/// Attachment keys holding raw radio scans; too bulky for map properties.
const SCAN_KEYS: &[&str] = &["cells", "wifis"];

/// Writes `value` as pretty-printed JSON followed by a newline.
pub fn write_json<W: Write>(mut out: W, value: &impl Serialize) -> Result<()> {
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Prints `value` as pretty-printed JSON on stdout.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    write_json(std::io::stdout().lock(), value)
}

fn feature(m: &Measurement) -> Value {
    let mut properties = Map::new();
    properties.insert("provider".into(), json!(m.provider));
    properties.insert("downloadMbps".into(), json!(m.download_mbps));
    properties.insert("uploadMbps".into(), json!(m.upload_mbps));
    properties.insert("pingMs".into(), json!(m.ping_ms));
    properties.insert("createdAt".into(), json!(m.timestamp));

    if let Some(Value::Object(extra)) = &m.attachment {
        for (k, v) in extra {
            if !SCAN_KEYS.contains(&k.as_str()) && !properties.contains_key(k) {
                properties.insert(k.clone(), v.clone());
            }
        }
    }

    json!({
        "type": "Feature",
        "geometry": {
            "type": "Point",
            "coordinates": [m.longitude, m.latitude],
        },
        "properties": properties,
    })
}

/// Measurements as a GeoJSON FeatureCollection of points (`[lon, lat]`).
pub fn measurements_geojson(measurements: &[Measurement]) -> Value {
    json!({
        "type": "FeatureCollection",
        "features": measurements.iter().map(feature).collect::<Vec<_>>(),
    })
}
