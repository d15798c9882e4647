use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::{BoxFuture, FutureExt};
use reqwest::{Client, Url};

pub const DEFAULT_API_URL: &str = "https://api.openweathermap.org/data/2.5/forecast";

/// Status line and body of a completed GET.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub body: Vec<u8>,
}

/// Low-level failure before any HTTP status was received.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Issues GET requests for the fetcher.
///
/// The returned future must not borrow `self`; the fetcher drives it on its
/// own task and may drop it when a newer request supersedes it.
pub trait Transport: Send + Sync + 'static {
    fn get(&self, url: String) -> BoxFuture<'static, Result<HttpResponse, TransportError>>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent("ForecastPanel/1.0")
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: String) -> BoxFuture<'static, Result<HttpResponse, TransportError>> {
        let client = self.client.clone();

        async move {
            let response = client
                .get(&url)
                .send()
                .await
                .map_err(|e| TransportError(e.to_string()))?;

            let status = response.status();
            let body = response
                .bytes()
                .await
                .map_err(|e| TransportError(format!("Failed to read response body: {}", e)))?;

            Ok(HttpResponse {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
                body: body.to_vec(),
            })
        }
        .boxed()
    }
}

/// Forecast URL for a location, metric units. Query values are percent-encoded.
pub fn build_request_url(base_url: &Url, latitude: f64, longitude: f64, api_key: &str) -> String {
    let mut url = base_url.clone();
    url.query_pairs_mut()
        .append_pair("lat", &latitude.to_string())
        .append_pair("lon", &longitude.to_string())
        .append_pair("appid", api_key)
        .append_pair("units", "metric");
    url.to_string()
}

/// Hide the API key before a URL goes to the log.
pub fn redact_api_key(url: &str) -> String {
    match url.find("appid=") {
        Some(start) => {
            let value_start = start + "appid=".len();
            let value_end = url[value_start..]
                .find('&')
                .map(|i| value_start + i)
                .unwrap_or(url.len());
            format!("{}***{}", &url[..value_start], &url[value_end..])
        }
        None => url.to_string(),
    }
}
