//! HTTP pull source: `GET` the fleet endpoint and decode the whole body.

use anyhow::Context;
use async_trait::async_trait;
use robofleet_core::{decode_snapshot, FleetError, FleetSnapshot, SnapshotSource};
use std::time::Duration;
use tracing::debug;

pub struct HttpSnapshotSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSnapshotSource {
    pub fn new(url: impl Into<String>, fetch_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .user_agent(concat!("robofleet-monitor/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn acquire(&self) -> Result<FleetSnapshot, FleetError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FleetError::unavailable(format!("GET {}: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FleetError::unavailable(format!("GET {} returned {status}", self.url)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FleetError::unavailable(format!("reading body from {}: {e}", self.url)))?;
        debug!(url = %self.url, bytes = body.len(), "fleet payload received");

        decode_snapshot(&body)
    }

    fn name(&self) -> &str {
        "http-poll"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        // port 9 (discard) is closed on test hosts
        let source =
            HttpSnapshotSource::new("http://127.0.0.1:9/api/robots", Duration::from_millis(500)).unwrap();
        let err = source.acquire().await.unwrap_err();
        assert!(matches!(err, FleetError::SourceUnavailable(_)));
        assert!(err.to_string().contains("127.0.0.1:9"));
    }
}
