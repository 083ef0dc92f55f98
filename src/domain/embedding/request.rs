//! Embedding request types

use serde::{Deserialize, Serialize};

/// Request to generate embeddings for an ordered batch of texts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// Model to use for embedding
    model: String,
    /// Texts to embed, in order
    texts: Vec<String>,
    /// Output dimensions (for models that support it)
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

impl EmbeddingRequest {
    /// Create a request for multiple texts
    pub fn batch(model: impl Into<String>, texts: Vec<String>) -> Self {
        Self {
            model: model.into(),
            texts,
            dimensions: None,
        }
    }

    /// Create a request for a single text
    pub fn single(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self::batch(model, vec![text.into()])
    }

    /// Set the output dimensions
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_request() {
        let request = EmbeddingRequest::single("text-embedding-v2", "hello");

        assert_eq!(request.model(), "text-embedding-v2");
        assert_eq!(request.texts(), &["hello".to_string()]);
        assert_eq!(request.len(), 1);
    }

    #[test]
    fn test_batch_request_with_dimensions() {
        let request =
            EmbeddingRequest::batch("text-embedding-3-small", vec!["a".into(), "b".into()])
                .with_dimensions(256);

        assert_eq!(request.len(), 2);
        assert_eq!(request.dimensions(), Some(256));
        assert!(!request.is_empty());
    }
}
