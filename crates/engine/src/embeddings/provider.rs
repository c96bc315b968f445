//! Embedding provider trait and factory.

use crate::config::EmbeddingConfig;
use docrag_core::{AppError, AppResult};
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a single provider request.
///
/// The variant decides what the client does next: transient failures are
/// retried with backoff, the others end the call immediately.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Rate limiting, server errors, dropped connections
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// Missing or refused credentials
    #[error("provider refused credentials: {0}")]
    Unauthenticated(String),

    /// The provider will never accept this request as sent
    #[error("provider rejected request: {0}")]
    Rejected(String),
}

/// Trait for embedding providers.
///
/// Implementations perform exactly one outbound request per call and leave
/// retries, batching, and timeouts to [`EmbeddingClient`](super::EmbeddingClient).
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Provider name (e.g., "openai", "ollama", "hash")
    fn provider_name(&self) -> &str;

    /// Model identifier
    fn model_name(&self) -> &str;

    /// Embedding dimensions the provider is expected to return
    fn dimensions(&self) -> usize;

    /// Embed a batch of texts; `result[i]` is the embedding of `texts[i]`.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

/// Create an embedding provider based on configuration.
pub fn create_provider(config: &EmbeddingConfig) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "hash" => Ok(Arc::new(super::providers::hash::HashProvider::new(
            config.dimensions,
        ))),

        "openai" => {
            let provider = super::providers::openai::OpenAiProvider::from_config(config)?;
            Ok(Arc::new(provider))
        }

        "ollama" => {
            let provider = super::providers::ollama::OllamaProvider::from_config(config)?;
            Ok(Arc::new(provider))
        }

        _ => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: openai, ollama, hash",
            config.provider
        ))),
    }
}
