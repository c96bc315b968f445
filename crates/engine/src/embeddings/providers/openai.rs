//! OpenAI embedding provider.
//!
//! Talks to any OpenAI-compatible `/v1/embeddings` endpoint. The API key is
//! read from the environment variable named in the configuration
//! (`OPENAI_API_KEY` by default); a missing key fails at construction time.

use crate::config::EmbeddingConfig;
use crate::embeddings::provider::{EmbeddingProvider, ProviderError};
use async_trait::async_trait;
use docrag_core::{AppError, AppResult};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const EMBEDDING_ENDPOINT: &str = "/embeddings";

/// OpenAI embedding provider.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl OpenAiProvider {
    /// Build a provider from configuration and the process environment.
    pub fn from_config(config: &EmbeddingConfig) -> AppResult<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AppError::ProviderUnauthenticated(format!(
                    "environment variable {} is not set",
                    config.api_key_env
                ))
            })?;

        Self::new(config, api_key)
    }

    /// Build a provider with an explicit API key.
    pub fn new(config: &EmbeddingConfig, api_key: impl Into<String>) -> AppResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AppError::ProviderUnauthenticated(
                "API key must not be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = config
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string());

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            dimensions: config.dimensions,
        })
    }

    /// Only the v3 models accept a requested output size.
    fn requested_dimensions(&self) -> Option<usize> {
        self.model
            .starts_with("text-embedding-3")
            .then_some(self.dimensions)
    }
}

/// Map an HTTP error status to the retry class it belongs to.
pub(crate) fn classify_status(status: StatusCode, detail: String) -> ProviderError {
    let message = format!("HTTP {}: {}", status, detail);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Unauthenticated(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_MANY_REQUESTS => {
            ProviderError::Transient(message)
        }
        s if s.is_server_error() => ProviderError::Transient(message),
        _ => ProviderError::Rejected(message),
    }
}

/// Transport failures never reached the provider's decision logic.
pub(crate) fn classify_transport(err: &reqwest::Error) -> ProviderError {
    if err.is_builder() {
        ProviderError::Rejected(format!("invalid request: {}", err))
    } else {
        ProviderError::Transient(format!("request failed: {}", err))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len(), provider = "openai", model = %self.model))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}{}", self.base_url, EMBEDDING_ENDPOINT);
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.requested_dimensions(),
        };

        debug!("Sending embedding request to {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(classify_status(status, detail));
        }

        let mut body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("failed to read response: {}", e)))?;

        // The API tags each item with its input position.
        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }
}
