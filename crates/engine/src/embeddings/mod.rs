//! Embedding client.
//!
//! Wraps an injected [`EmbeddingProvider`] with the policies the engine relies
//! on: order-preserving batching, a timeout on every provider call, retries
//! with exponential backoff for transient failures, and validation of what
//! the provider returns. The client holds no document state.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider, ProviderError};

use crate::config::EmbeddingConfig;
use docrag_core::{AppError, AppResult};
use futures::{StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry schedule for transient provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per request, including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, doubling from the initial backoff.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl From<&EmbeddingConfig> for RetryPolicy {
    fn from(config: &EmbeddingConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

/// Order-preserving, retrying front for an embedding provider.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    dimensions: usize,
    batch_size: usize,
    max_concurrent_batches: usize,
    request_timeout: Duration,
    retry: RetryPolicy,
}

impl EmbeddingClient {
    /// The provider must produce the configured dimensionality.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> AppResult<Self> {
        config.validate()?;

        if provider.dimensions() != config.dimensions {
            return Err(AppError::DimensionMismatch {
                expected: config.dimensions,
                actual: provider.dimensions(),
            });
        }

        Ok(Self {
            provider,
            dimensions: config.dimensions,
            batch_size: config.batch_size,
            max_concurrent_batches: config.max_concurrent_batches,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            retry: RetryPolicy::from(config),
        })
    }

    /// Override the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Embed texts; `result[i]` is the embedding of `texts[i]`.
    ///
    /// Texts are split into batches of at most `batch_size`. Several batches
    /// may be in flight at once but results are reassembled in input order.
    /// The first batch that fails for good fails the whole call.
    pub async fn embed(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Embedding {} texts with provider '{}' (model: {}, batch size: {})",
            texts.len(),
            self.provider.provider_name(),
            self.provider.model_name(),
            self.batch_size
        );

        let owned: Vec<Vec<String>> = texts
            .chunks(self.batch_size)
            .map(<[String]>::to_vec)
            .collect();
        let batches: Vec<Vec<Vec<f32>>> = futures::stream::iter(owned)
            .map(|batch: Vec<String>| async move { self.embed_batch_with_retry(&batch).await })
            .buffered(self.max_concurrent_batches)
            .try_collect()
            .await?;

        Ok(batches.into_iter().flatten().collect())
    }

    /// Embed a single text as a one-item batch.
    pub async fn embed_one(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            AppError::ProviderRejected("provider returned no embedding".to_string())
        })
    }

    async fn embed_batch_with_retry(&self, batch: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let outcome =
                tokio::time::timeout(self.request_timeout, self.provider.embed_batch(batch)).await;

            let reason = match outcome {
                Ok(Ok(vectors)) => return self.check_batch(batch.len(), vectors),
                Ok(Err(ProviderError::Unauthenticated(msg))) => {
                    return Err(AppError::ProviderUnauthenticated(msg))
                }
                Ok(Err(ProviderError::Rejected(msg))) => return Err(AppError::ProviderRejected(msg)),
                Ok(Err(ProviderError::Transient(msg))) => msg,
                Err(_) => format!("request timed out after {:?}", self.request_timeout),
            };

            if attempt >= self.retry.max_attempts {
                return Err(AppError::ProviderUnavailable(format!(
                    "{} failed after {} attempts: {}",
                    self.provider.provider_name(),
                    attempt,
                    reason
                )));
            }

            let backoff = self.retry.backoff_for(attempt);
            warn!(
                "Embedding batch of {} failed (attempt {}/{}): {}; retrying in {:?}",
                batch.len(),
                attempt,
                self.retry.max_attempts,
                reason,
                backoff
            );
            tokio::time::sleep(backoff).await;
        }
    }

    fn check_batch(&self, expected: usize, vectors: Vec<Vec<f32>>) -> AppResult<Vec<Vec<f32>>> {
        if vectors.len() != expected {
            return Err(AppError::ProviderRejected(format!(
                "provider returned {} embeddings for {} inputs",
                vectors.len(),
                expected
            )));
        }

        for vector in &vectors {
            if vector.len() != self.dimensions {
                return Err(AppError::DimensionMismatch {
                    expected: self.dimensions,
                    actual: vector.len(),
                });
            }
            if vector.iter().any(|v| !v.is_finite()) {
                return Err(AppError::ProviderRejected(
                    "provider returned a non-finite embedding component".to_string(),
                ));
            }
        }

        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fakes::{FakeProvider, Step};

    fn config(dimensions: usize, batch_size: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "fake".to_string(),
            dimensions,
            batch_size,
            max_concurrent_batches: 3,
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
            request_timeout_secs: 5,
            ..Default::default()
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text {}", i)).collect()
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(500));
    }

    #[test]
    fn test_provider_dimension_mismatch_rejected() {
        let provider = Arc::new(FakeProvider::new(8));
        let result = EmbeddingClient::new(provider, &config(16, 10));
        assert!(matches!(
            result,
            Err(AppError::DimensionMismatch { expected: 16, actual: 8 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_preserved_across_batches() {
        let provider = Arc::new(FakeProvider::new(4));
        let client = EmbeddingClient::new(provider.clone(), &config(4, 3)).unwrap();

        let input = texts(10);
        let vectors = client.embed(&input).await.unwrap();

        assert_eq!(vectors.len(), 10);
        for (text, vector) in input.iter().zip(&vectors) {
            assert_eq!(vector, &FakeProvider::vector_for(text, 4));
        }
        assert_eq!(provider.batch_sizes(), vec![3, 3, 3, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let provider = Arc::new(FakeProvider::new(4).script(vec![
            Step::Transient,
            Step::Transient,
            Step::Succeed,
        ]));
        let client = EmbeddingClient::new(provider.clone(), &config(4, 10)).unwrap();

        let vectors = client.embed(&texts(2)).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_are_unavailable() {
        let provider = Arc::new(FakeProvider::new(4).script(vec![Step::Transient; 5]));
        let client = EmbeddingClient::new(provider.clone(), &config(4, 10)).unwrap();

        let result = client.embed(&texts(2)).await;
        assert!(matches!(result, Err(AppError::ProviderUnavailable(_))));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthenticated_is_not_retried() {
        let provider = Arc::new(FakeProvider::new(4).script(vec![Step::Unauthenticated]));
        let client = EmbeddingClient::new(provider.clone(), &config(4, 10)).unwrap();

        let result = client.embed(&texts(2)).await;
        assert!(matches!(result, Err(AppError::ProviderUnauthenticated(_))));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_transient() {
        let provider = Arc::new(FakeProvider::new(4).script(vec![Step::Hang, Step::Succeed]));
        let client = EmbeddingClient::new(provider.clone(), &config(4, 10))
            .unwrap()
            .with_request_timeout(Duration::from_millis(50));

        let vectors = client.embed(&texts(1)).await.unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_count_and_dimension_detected() {
        let provider = Arc::new(FakeProvider::new(4).script(vec![Step::DropLast]));
        let client = EmbeddingClient::new(provider, &config(4, 10)).unwrap();
        let result = client.embed(&texts(3)).await;
        assert!(matches!(result, Err(AppError::ProviderRejected(_))));

        let provider = Arc::new(FakeProvider::new(4).script(vec![Step::WrongDimensions(7)]));
        let client = EmbeddingClient::new(provider, &config(4, 10)).unwrap();
        let result = client.embed(&texts(3)).await;
        assert!(matches!(
            result,
            Err(AppError::DimensionMismatch { expected: 4, actual: 7 })
        ));
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_call() {
        let provider = Arc::new(FakeProvider::new(4));
        let client = EmbeddingClient::new(provider.clone(), &config(4, 10)).unwrap();
        assert!(client.embed(&[]).await.unwrap().is_empty());
        assert_eq!(provider.calls(), 0);
    }
}
