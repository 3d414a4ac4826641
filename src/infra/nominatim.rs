use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::fetch::{HttpClient, fetch_json};
use crate::services::Describer;

pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";

#[derive(Deserialize)]
struct ReverseResponse {
    display_name: Option<String>,
}

/// Reverse geocoder backed by a Nominatim instance.
///
/// The public instance rejects requests without a `User-Agent`, so wrap the
/// client in [`Header::user_agent`](crate::fetch::auth::Header::user_agent).
pub struct NominatimDescriber<C> {
    client: C,
    base_url: String,
}

impl<C: HttpClient> NominatimDescriber<C> {
    pub fn new(client: C, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl<C: HttpClient> Describer for NominatimDescriber<C> {
    #[tracing::instrument(skip(self))]
    async fn describe(&self, latitude: f64, longitude: f64) -> Result<String> {
        let url = format!(
            "{}/reverse?format=json&lat={latitude}&lon={longitude}&zoom=10&addressdetails=1",
            self.base_url
        );
        let body: ReverseResponse = fetch_json(&self.client, &url).await?;
        body.display_name
            .ok_or_else(|| anyhow::anyhow!("no display_name for {latitude},{longitude}"))
    }
}
