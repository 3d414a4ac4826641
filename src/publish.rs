//! Publication of aggregated views to S3.

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use tracing::info;

use crate::trends::{ProviderTestsView, SummaryView};

pub const SUMMARIES_KEY: &str = "aggregates/summaries";
pub const PROVIDERS_KEY: &str = "aggregates/providers";

/// Provider index uploaded next to the summaries.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderIndex {
    pub generated_at: DateTime<Utc>,
    pub providers: Vec<ProviderTestsView>,
}

/// JSON body and object key suffix, gzip-compressed when requested.
pub fn encode_json(value: &impl Serialize, gzip: bool) -> Result<(Vec<u8>, &'static str)> {
    let body = serde_json::to_vec(value)?;
    if !gzip {
        return Ok((body, ".json"));
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&body)?;
    Ok((encoder.finish()?, ".json.gz"))
}

/// Serializes a value to JSON and uploads it to an S3 bucket with
/// `application/json` content type. Returns the object key.
pub async fn write_json_to_s3(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key_stem: &str,
    value: &impl Serialize,
    gzip: bool,
) -> Result<String> {
    let (body, suffix) = encode_json(value, gzip)?;
    let key = format!("{key_stem}{suffix}");

    let mut request = client
        .put_object()
        .bucket(bucket)
        .key(&key)
        .body(body.into())
        .content_type("application/json");
    if gzip {
        request = request.content_encoding("gzip");
    }
    request.send().await?;

    Ok(key)
}

/// Uploads summary views and the provider index. Returns the keys written.
#[tracing::instrument(skip(client, summaries, providers), fields(summaries = summaries.len()))]
pub async fn publish_summaries(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    summaries: &[SummaryView],
    providers: Vec<ProviderTestsView>,
    gzip: bool,
) -> Result<Vec<String>> {
    let index = ProviderIndex {
        generated_at: Utc::now(),
        providers,
    };

    let keys = vec![
        write_json_to_s3(client, bucket, SUMMARIES_KEY, &summaries, gzip).await?,
        write_json_to_s3(client, bucket, PROVIDERS_KEY, &index, gzip).await?,
    ];

    info!(bucket, ?keys, "Published aggregates to S3");
    Ok(keys)
}
