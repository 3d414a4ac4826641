use crate::fetch::client::HttpClient;
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};

/// An [`HttpClient`] wrapper that sets a fixed header on every request.
///
/// Used for the `User-Agent` that public geocoding services require.
pub struct Header<C> {
    inner: C,
    name: HeaderName,
    value: HeaderValue,
}

impl<C> Header<C> {
    /// Fails when `name` or `value` is not a legal header.
    pub fn new(inner: C, name: &str, value: &str) -> anyhow::Result<Self> {
        Ok(Self {
            inner,
            name: HeaderName::from_bytes(name.as_bytes())?,
            value: HeaderValue::from_str(value)?,
        })
    }

    pub fn user_agent(inner: C, agent: &str) -> anyhow::Result<Self> {
        Self::new(inner, "User-Agent", agent)
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for Header<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut().insert(self.name.clone(), self.value.clone());
        self.inner.execute(req).await
    }
}
