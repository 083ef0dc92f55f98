//! Bounded exponential-backoff retries around an embedding provider

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::embedding::{
    validate_batch, EmbeddingProvider, EmbeddingRequest, EmbeddingResponse,
};
use crate::domain::DomainError;
use crate::infrastructure::observability::{
    record_embedding_request, record_embedding_retry, EmbeddingRequestMetricParams,
};

/// Retry policy for embedding calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 200,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    pub fn with_initial_delay(mut self, ms: u64) -> Self {
        self.initial_delay_ms = ms;
        self
    }

    pub fn with_max_delay(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    /// Delay before retry number `attempt` (0-indexed), without jitter
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(delay.min(self.max_delay_ms as f64) as u64)
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.delay_for_attempt(attempt);
        let jitter_ms = base.as_millis() as u64 / 4;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// Embedding provider that retries retryable failures
#[derive(Debug, Clone)]
pub struct RetryingEmbeddingProvider {
    inner: Arc<dyn EmbeddingProvider>,
    config: RetryConfig,
}

impl RetryingEmbeddingProvider {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

impl RetryingEmbeddingProvider {
    /// Run `call` until it succeeds, fails with a non-retryable error or
    /// attempts run out
    async fn retry<T, F, Fut>(&self, texts: usize, mut call: F) -> Result<T, DomainError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, DomainError>> + Send,
        T: Send,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let started = Instant::now();
            let result = call().await;
            record_embedding_request(EmbeddingRequestMetricParams {
                provider: self.inner.provider_name(),
                model: self.inner.model(),
                duration: started.elapsed(),
                success: result.is_ok(),
                texts,
            });

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.config.jittered_delay(attempt - 1);
                    warn!(
                        provider = self.inner.provider_name(),
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Embedding request failed, retrying"
                    );
                    record_embedding_retry(self.inner.provider_name());
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for RetryingEmbeddingProvider {
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, DomainError> {
        self.retry(request.texts().len(), || self.inner.embed(request.clone()))
            .await
    }

    /// Malformed batches (wrong count, indices or size) are retried too
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, DomainError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let expected = texts.len();
        let request = EmbeddingRequest::batch(self.inner.model(), texts);

        self.retry(expected, || {
            let request = request.clone();
            async move {
                let response = self.inner.embed(request).await?;
                validate_batch(
                    self.inner.provider_name(),
                    self.inner.dimensions(),
                    expected,
                    response,
                )
            }
        })
        .await
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::embedding::MockEmbeddingProvider;

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig::new(max_attempts).with_initial_delay(1).with_max_delay(2)
    }

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig::default();

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(400));
        assert_eq!(config.delay_for_attempt(10), Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn test_recovers_from_transient_failures() {
        let inner = Arc::new(MockEmbeddingProvider::new(8).failing_times(2));
        let provider = RetryingEmbeddingProvider::new(inner.clone(), fast(3));

        let vector = provider.embed_text("hello").await.unwrap();

        assert_eq!(vector.len(), 8);
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let inner = Arc::new(MockEmbeddingProvider::new(8).with_error("unreachable"));
        let provider = RetryingEmbeddingProvider::new(inner.clone(), fast(3));

        let result = provider.embed_text("hello").await;

        assert!(matches!(result, Err(DomainError::Embedding { .. })));
        assert_eq!(inner.calls(), 3);
    }

    #[derive(Debug, Default)]
    struct RejectingProvider {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for RejectingProvider {
        async fn embed(&self, _request: EmbeddingRequest) -> Result<EmbeddingResponse, DomainError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(DomainError::validation("input too long"))
        }

        fn provider_name(&self) -> &'static str {
            "rejecting"
        }

        fn model(&self) -> &str {
            "m"
        }

        fn dimensions(&self) -> usize {
            8
        }
    }

    #[tokio::test]
    async fn test_non_retryable_errors_fail_fast() {
        let inner = Arc::new(RejectingProvider::default());
        let provider = RetryingEmbeddingProvider::new(inner.clone(), fast(3));

        let result = provider.embed_text("t").await;

        assert!(matches!(result, Err(DomainError::Validation { .. })));
        assert_eq!(inner.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    /// Returns one vector fewer than requested until `healthy_after` calls
    #[derive(Debug, Default)]
    struct ShortBatchProvider {
        calls: std::sync::atomic::AtomicUsize,
        healthy_after: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for ShortBatchProvider {
        async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, DomainError> {
            let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            let mut count = request.texts().len();
            if self.healthy_after == 0 || call <= self.healthy_after {
                count -= 1;
            }
            let data = (0..count)
                .map(|i| crate::domain::embedding::Embedding::new(i, vec![1.0; 4]))
                .collect();
            Ok(EmbeddingResponse::new(request.model(), data))
        }

        fn provider_name(&self) -> &'static str {
            "short"
        }

        fn model(&self) -> &str {
            "m"
        }

        fn dimensions(&self) -> usize {
            4
        }
    }

    #[tokio::test]
    async fn test_malformed_batch_is_retried() {
        let inner = Arc::new(ShortBatchProvider::default());
        let provider = RetryingEmbeddingProvider::new(inner.clone(), fast(3));

        let result = provider.embed_batch(vec!["a".into(), "b".into()]).await;

        assert!(matches!(result, Err(DomainError::Embedding { .. })));
        assert_eq!(inner.calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_malformed_batch_recovers() {
        let inner = Arc::new(ShortBatchProvider {
            healthy_after: 1,
            ..Default::default()
        });
        let provider = RetryingEmbeddingProvider::new(inner.clone(), fast(3));

        let vectors = provider
            .embed_batch(vec!["a".into(), "b".into()])
            .await
            .unwrap();

        assert_eq!(vectors.len(), 2);
        assert_eq!(inner.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn test_delegates_metadata() {
        let provider = RetryingEmbeddingProvider::new(
            Arc::new(MockEmbeddingProvider::new(16)),
            RetryConfig::default(),
        );

        assert_eq!(provider.provider_name(), "mock");
        assert_eq!(provider.dimensions(), 16);
    }
}
