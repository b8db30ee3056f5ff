//! `reqwest`-backed [`Fetcher`] used outside of tests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::debug;

use crate::contract::{FetchedResponse, Fetcher};
use crate::error::FetchError;

/// Shared HTTP client; one instance serves every task of a run.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Every request, including reading the body, is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bookref/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        let parsed = reqwest::Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        let resp = self.client.get(parsed).send().await?;

        let status = resp.status();
        if !status.is_success() {
            debug!(url = %url, status = %status, "Non-success response");
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.bytes().await?.to_vec();
        debug!(url = %url, bytes = body.len(), content_type = ?content_type, "Fetched");

        Ok(FetchedResponse {
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

/// Resolves `reference` against `base_url`; absolute references pass through.
pub fn join_url(base_url: &str, reference: &str) -> Result<String, FetchError> {
    let base = reqwest::Url::parse(base_url).map_err(|_| FetchError::InvalidUrl(base_url.to_string()))?;
    base.join(reference)
        .map(String::from)
        .map_err(|_| FetchError::InvalidUrl(reference.to_string()))
}
