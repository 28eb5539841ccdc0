//! Shared HTTP client for the feeds and control endpoints.
//!
//! Every request bypasses caches: the feeds describe live server state.

use crate::error::{FeedError, Result};
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, PRAGMA};
use serde::de::DeserializeOwned;
use std::time::Duration;

const USER_AGENT: &str = concat!("onair/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(4);

/// Thin wrapper around `reqwest::Client` with no-cache headers, user agent
/// and timeouts applied once.  Cheap to clone.
#[derive(Clone)]
pub struct Fetcher {
    inner: reqwest::Client,
}

impl Fetcher {
    pub fn new(request_timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache, no-store"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let inner = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT.min(request_timeout))
            .timeout(request_timeout)
            .build()?;
        Ok(Self { inner })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self.inner.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }
        Ok(response)
    }

    /// GET a URL and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let body = self.get(url).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn get_text(&self, url: &str) -> Result<String> {
        Ok(self.get(url).await?.text().await?)
    }

    /// GET a URL for its side effect; the body is not interpreted.
    pub async fn get_discard(&self, url: &str) -> Result<()> {
        self.get(url).await?;
        Ok(())
    }
}
