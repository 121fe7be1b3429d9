use std::{fmt, time::Duration};

use anyhow::Context;
use futures::Stream;
use serde_json::Value;
use tracing::{debug, instrument};

use ollqd_core::{BackendError, RelayFrame, relay::relay_lines};

use crate::infra::config::OllamaConfig;

/// Client for the Ollama model-management API.
#[derive(Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
}

impl fmt::Debug for OllamaClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OllamaClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig) -> anyhow::Result<Self> {
        // Pulls run for minutes; only the connect phase is bounded.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .context("failed to build Ollama HTTP client")?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    /// Start a model pull and relay its progress lines. Fails only if the
    /// call cannot be opened; read errors after that become a
    /// [`RelayFrame::Error`] inside the stream.
    #[instrument(skip(self, body))]
    pub async fn pull(
        &self,
        body: &Value,
    ) -> Result<impl Stream<Item = RelayFrame> + Send + 'static + use<>, BackendError> {
        let url = format!("{}/api/pull", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|err| BackendError::unavailable(format!("ollama error: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(BackendError::unavailable(format!(
                "ollama returned {status}: {}",
                detail.trim()
            )));
        }

        debug!(%url, "model pull started");
        Ok(relay_lines(response.bytes_stream()))
    }
}
