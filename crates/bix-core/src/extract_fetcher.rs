use std::time::Duration;

use async_trait::async_trait;
use bix_config::PipelineConfig;
use bix_types::{DateWindow, ExtractBatch, PipelineError, Result};
use reqwest::StatusCode;
use tracing::{debug, info};

/// Source of extract rows for a date window.
#[async_trait]
pub trait ExtractSource: Send + Sync {
    /// Fetch every row in `window`.
    async fn fetch(&self, window: &DateWindow) -> Result<ExtractBatch>;
}

/// HTTP client for the BI reporting API.
pub struct BiApiClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    key_header: String,
}

impl BiApiClient {
    pub fn new(url: &str, api_key: &str, key_header: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: url.to_string(),
            api_key: api_key.to_string(),
            key_header: key_header.to_string(),
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::new(
            &config.bi_api_url,
            &config.bi_api_key,
            &config.bi_api_key_header,
            Duration::from_secs(config.bi_api_timeout_secs),
        )
    }
}

#[async_trait]
impl ExtractSource for BiApiClient {
    async fn fetch(&self, window: &DateWindow) -> Result<ExtractBatch> {
        let request = self
            .http
            .get(&self.url)
            .header(self.key_header.as_str(), self.api_key.as_str())
            .query(&window.query_pairs())
            .build()
            .map_err(|e| PipelineError::Config(format!("Invalid reporting API request: {e}")))?;

        let method = request.method().to_string();
        let uri = request.url().to_string();
        debug!(%uri, "Requesting extract");

        let transport_error = |status: Option<u16>, reason: String| PipelineError::UpstreamTransport {
            method: method.clone(),
            uri: uri.clone(),
            status,
            reason,
        };

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| transport_error(e.status().map(|s| s.as_u16()), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(transport_error(
                Some(status.as_u16()),
                format!("status code {}", status.as_u16()),
            ));
        }

        if status == StatusCode::NO_CONTENT {
            return Err(PipelineError::UpstreamEmptyWindow { window: *window });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(Some(status.as_u16()), e.to_string()))?;

        let batch = decode_batch(&body)?;
        info!(rows = batch.len(), %window, "Extract fetched");
        Ok(batch)
    }
}

/// Decode a reporting API body. A JSON `null` is an error, `[]` is not.
pub fn decode_batch(body: &[u8]) -> Result<ExtractBatch> {
    let decoded: Option<ExtractBatch> = serde_json::from_slice(body).map_err(|e| {
        PipelineError::UpstreamMalformed(format!("body is not a valid extract batch: {e}"))
    })?;
    decoded.ok_or_else(|| PipelineError::UpstreamMalformed("decoded batch is null".to_string()))
}
