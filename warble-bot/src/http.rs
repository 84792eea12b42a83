//! HTTPS REST client backing the engine's `HttpClient` contract.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;

use warble_core::{HttpClient, WarbleError};

const DEFAULT_BASE_URL: &str = "https://discord.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin wrapper over a pooled `reqwest` client.
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

impl RestClient {
    pub fn new() -> Result<Self, WarbleError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Point the client somewhere else (tests, proxies).
    pub fn with_base_url(base_url: &str) -> Result<Self, WarbleError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| WarbleError::Http(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl HttpClient for RestClient {
    async fn post(
        &self,
        path: &str,
        auth_header: &str,
        json_body: &str,
    ) -> Result<u16, WarbleError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "POST");
        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, auth_header)
            .header(CONTENT_TYPE, "application/json")
            .body(json_body.to_string())
            .send()
            .await
            .map_err(|e| WarbleError::Http(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}
