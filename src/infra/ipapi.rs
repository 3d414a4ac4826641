use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::fetch::{HttpClient, fetch_json};
use crate::measurement::Coordinates;
use crate::services::Locator;

pub const DEFAULT_BASE_URL: &str = "https://ipapi.co";

#[derive(Deserialize)]
struct IpApiResponse {
    latitude: Option<f64>,
    longitude: Option<f64>,
    #[serde(default)]
    error: bool,
    reason: Option<String>,
}

/// Locates addresses with the ipapi.co JSON API (`{base}/{ip}/json/`).
pub struct IpApiLocator<C> {
    client: C,
    base_url: String,
}

impl<C: HttpClient> IpApiLocator<C> {
    pub fn new(client: C, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl<C: HttpClient> Locator for IpApiLocator<C> {
    #[tracing::instrument(skip(self))]
    async fn resolve(&self, address: &str) -> Result<Coordinates> {
        let url = format!("{}/{}/json/", self.base_url, address);
        let body: IpApiResponse = fetch_json(&self.client, &url).await?;

        if body.error {
            return Err(anyhow::anyhow!(
                "IP lookup failed: {}",
                body.reason.unwrap_or_else(|| "unknown reason".to_string())
            ));
        }

        match (body.latitude, body.longitude) {
            (Some(latitude), Some(longitude)) => {
                debug!(latitude, longitude, "IP lookup succeeded");
                Ok(Coordinates::new(latitude, longitude))
            }
            _ => Err(anyhow::anyhow!("No lat/lon from IP API")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::BasicClient;
    use crate::fetch::auth::UrlParam;
    use crate::infra::canned::serve_once;

    #[tokio::test]
    async fn test_resolve_reads_coordinates() {
        let (base, request) =
            serve_once(200, r#"{"ip":"203.0.113.9","latitude":28.6,"longitude":77.2}"#).await;
        let locator = IpApiLocator::new(BasicClient::new().unwrap(), base);

        let c = locator.resolve("203.0.113.9").await.unwrap();
        assert_eq!(c, Coordinates::new(28.6, 77.2));
        assert!(request.await.unwrap().starts_with("GET /203.0.113.9/json/ "));
    }

    #[tokio::test]
    async fn test_resolve_appends_api_key() {
        let (base, request) = serve_once(200, r#"{"latitude":1.5,"longitude":2.5}"#).await;
        let client = UrlParam {
            inner: BasicClient::new().unwrap(),
            param_name: "key".to_string(),
            key: "secret".to_string(),
        };
        let locator = IpApiLocator::new(client, format!("{base}/"));

        locator.resolve("198.51.100.1").await.unwrap();
        assert!(
            request
                .await
                .unwrap()
                .starts_with("GET /198.51.100.1/json/?key=secret ")
        );
    }

    #[tokio::test]
    async fn test_resolve_error_payload() {
        let (base, _request) =
            serve_once(200, r#"{"error":true,"reason":"Reserved IP Address"}"#).await;
        let locator = IpApiLocator::new(BasicClient::new().unwrap(), base);

        let err = locator.resolve("127.0.0.1").await.unwrap_err();
        assert!(err.to_string().contains("Reserved IP Address"));
    }

    #[tokio::test]
    async fn test_resolve_missing_coordinates() {
        let (base, _request) = serve_once(200, r#"{"latitude":null}"#).await;
        let locator = IpApiLocator::new(BasicClient::new().unwrap(), base);
        assert!(locator.resolve("10.0.0.1").await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_http_failure() {
        let (base, _request) = serve_once(429, r#"{"reason":"RateLimited"}"#).await;
        let locator = IpApiLocator::new(BasicClient::new().unwrap(), base);

        let err = locator.resolve("10.0.0.1").await.unwrap_err();
        assert!(err.to_string().contains("429"));
    }
}
