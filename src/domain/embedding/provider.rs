//! Embedding provider trait definition

use async_trait::async_trait;
use std::fmt::Debug;

use super::{EmbeddingRequest, EmbeddingResponse};
use crate::domain::DomainError;

/// Trait for embedding providers (OpenAI-compatible, DashScope, ...)
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + Debug {
    /// Generate embeddings for the given request
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, DomainError>;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;

    /// Model used for every request
    fn model(&self) -> &str;

    /// Dimensionality of the vectors this provider returns
    fn dimensions(&self) -> usize;

    /// Embed a batch of texts, preserving order
    ///
    /// The response must contain exactly one vector of the configured
    /// dimensionality per input, otherwise it is treated as malformed.
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, DomainError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let expected = texts.len();
        let response = self.embed(EmbeddingRequest::batch(self.model(), texts)).await?;
        validate_batch(self.provider_name(), self.dimensions(), expected, response)
    }

    /// Embed a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, DomainError> {
        self.embed_batch(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| DomainError::embedding(self.provider_name(), "empty response"))
    }
}

/// Check a batch response and return its vectors in input order
///
/// Failures are `Embedding` errors, so a retrying caller treats a malformed
/// response like any other transient provider failure.
pub fn validate_batch(
    provider: &str,
    dimensions: usize,
    expected: usize,
    response: EmbeddingResponse,
) -> Result<Vec<Vec<f32>>, DomainError> {
    let vectors = response
        .into_ordered_vectors(expected)
        .map_err(|message| DomainError::embedding(provider, message))?;

    for (index, vector) in vectors.iter().enumerate() {
        if vector.len() != dimensions {
            return Err(DomainError::embedding(
                provider,
                format!(
                    "expected {}-dimensional embeddings, got {}",
                    dimensions,
                    vector.len()
                ),
            ));
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(DomainError::embedding(
                provider,
                format!("embedding {} has non-finite components", index),
            ));
        }
    }

    Ok(vectors)
}
