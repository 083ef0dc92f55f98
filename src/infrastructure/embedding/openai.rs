//! OpenAI-compatible embedding provider

use async_trait::async_trait;
use serde::Deserialize;

use super::HttpClientTrait;
use crate::domain::embedding::{Embedding, EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};
use crate::domain::DomainError;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Known OpenAI embedding models and their native dimensions
const EMBEDDING_MODELS: &[(&str, usize)] = &[
    ("text-embedding-3-small", 1536),
    ("text-embedding-3-large", 3072),
    ("text-embedding-ada-002", 1536),
];

/// Provider for any `/v1/embeddings` endpoint
#[derive(Debug)]
pub struct OpenAiEmbeddingProvider<C: HttpClientTrait> {
    client: C,
    headers: Vec<(String, String)>,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl<C: HttpClientTrait> OpenAiEmbeddingProvider<C> {
    pub fn new(
        client: C,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self::with_base_url(client, api_key, DEFAULT_OPENAI_BASE_URL, model, dimensions)
    }

    pub fn with_base_url(
        client: C,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        let headers = vec![
            ("Authorization".to_string(), format!("Bearer {}", api_key.into())),
            ("Content-Type".to_string(), "application/json".to_string()),
        ];

        Self {
            client,
            headers,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimensions,
        }
    }

    fn embeddings_url(&self) -> String {
        format!("{}/v1/embeddings", self.base_url)
    }

    /// Models whose native size differs from the configured one are asked to shorten
    fn needs_dimensions_param(&self, model: &str) -> bool {
        EMBEDDING_MODELS
            .iter()
            .find(|(name, _)| *name == model)
            .map(|(_, native)| *native != self.dimensions)
            .unwrap_or(false)
    }

    fn build_request(&self, request: &EmbeddingRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model(),
            "input": request.texts(),
            "encoding_format": "float",
        });

        let dimensions = request.dimensions().or_else(|| {
            self.needs_dimensions_param(request.model())
                .then_some(self.dimensions)
        });
        if let Some(dims) = dimensions {
            body["dimensions"] = serde_json::json!(dims);
        }

        body
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<EmbeddingResponse, DomainError> {
        let response: OpenAiEmbeddingResponse = serde_json::from_value(json).map_err(|e| {
            DomainError::embedding("openai", format!("Failed to parse embedding response: {}", e))
        })?;

        let embeddings: Vec<Embedding> = response
            .data
            .into_iter()
            .map(|d| Embedding::new(d.index, d.embedding))
            .collect();

        let mut parsed = EmbeddingResponse::new(response.model, embeddings);
        if let Some(usage) = response.usage {
            parsed = parsed.with_total_tokens(usage.total_tokens);
        }
        Ok(parsed)
    }
}

#[async_trait]
impl<C: HttpClientTrait> EmbeddingProvider for OpenAiEmbeddingProvider<C> {
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, DomainError> {
        let body = self.build_request(&request);

        let response = self
            .client
            .post_json(&self.embeddings_url(), &self.headers, &body)
            .await
            .map_err(|e| match e {
                DomainError::Embedding { message, .. } => DomainError::embedding("openai", message),
                other => other,
            })?;

        self.parse_response(response)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    model: String,
    data: Vec<OpenAiEmbeddingData>,
    usage: Option<OpenAiEmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingUsage {
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::embedding::MockHttpClientTrait;

    const TEST_URL: &str = "https://api.openai.com/v1/embeddings";

    fn mock_response(order: &[usize], dimensions: usize) -> serde_json::Value {
        let data: Vec<serde_json::Value> = order
            .iter()
            .map(|&i| {
                let embedding: Vec<f32> = (0..dimensions).map(|j| (i * 10 + j) as f32).collect();
                serde_json::json!({ "index": i, "embedding": embedding, "object": "embedding" })
            })
            .collect();

        serde_json::json!({
            "model": "text-embedding-3-small",
            "data": data,
            "usage": { "prompt_tokens": 10, "total_tokens": 10 }
        })
    }

    #[tokio::test]
    async fn test_embed_batch_reorders_by_index() {
        let mut client = MockHttpClientTrait::new();
        client
            .expect_post_json()
            .withf(|url, headers, body| {
                url == TEST_URL
                    && headers.iter().any(|(k, v)| k == "Authorization" && v == "Bearer sk")
                    && body["input"] == serde_json::json!(["a", "b"])
            })
            .times(1)
            .returning(|_, _, _| Ok(mock_response(&[1, 0], 3)));

        let provider = OpenAiEmbeddingProvider::new(client, "sk", "text-embedding-3-small", 3);
        let vectors = provider
            .embed_batch(vec!["a".into(), "b".into()])
            .await
            .unwrap();

        assert_eq!(vectors[0], vec![0.0, 1.0, 2.0]);
        assert_eq!(vectors[1], vec![10.0, 11.0, 12.0]);
    }

    #[test]
    fn test_dimensions_param_only_when_shortening() {
        let provider = OpenAiEmbeddingProvider::new(
            MockHttpClientTrait::new(),
            "sk",
            "text-embedding-3-large",
            1024,
        );
        let body = provider.build_request(&EmbeddingRequest::single("text-embedding-3-large", "x"));
        assert_eq!(body["dimensions"], 1024);

        let provider = OpenAiEmbeddingProvider::new(
            MockHttpClientTrait::new(),
            "sk",
            "text-embedding-3-small",
            1536,
        );
        let body = provider.build_request(&EmbeddingRequest::single("text-embedding-3-small", "x"));
        assert!(body.get("dimensions").is_none());
    }

    #[tokio::test]
    async fn test_missing_embedding_is_malformed() {
        let mut client = MockHttpClientTrait::new();
        client
            .expect_post_json()
            .returning(|_, _, _| Ok(mock_response(&[0], 3)));

        let provider = OpenAiEmbeddingProvider::new(client, "sk", "text-embedding-3-small", 3);
        let result = provider.embed_batch(vec!["a".into(), "b".into()]).await;

        assert!(matches!(result, Err(DomainError::Embedding { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_index_is_malformed() {
        let mut client = MockHttpClientTrait::new();
        client
            .expect_post_json()
            .returning(|_, _, _| Ok(mock_response(&[0, 0], 3)));

        let provider = OpenAiEmbeddingProvider::new(client, "sk", "text-embedding-3-small", 3);
        let result = provider.embed_batch(vec!["a".into(), "b".into()]).await;

        assert!(matches!(result, Err(DomainError::Embedding { .. })));
    }

    #[tokio::test]
    async fn test_unparseable_body_is_embedding_error() {
        let mut client = MockHttpClientTrait::new();
        client
            .expect_post_json()
            .returning(|_, _, _| Ok(serde_json::json!({ "error": "nope" })));

        let provider = OpenAiEmbeddingProvider::new(client, "sk", "text-embedding-3-small", 3);
        let err = provider.embed_text("a").await.unwrap_err();

        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_transport_error_names_provider() {
        let mut client = MockHttpClientTrait::new();
        client
            .expect_post_json()
            .returning(|_, _, _| Err(DomainError::embedding("http", "connection refused")));

        let provider = OpenAiEmbeddingProvider::new(client, "sk", "text-embedding-3-small", 3);
        let err = provider.embed_text("a").await.unwrap_err();

        assert_eq!(err.to_string(), "Embedding error: openai - connection refused");
    }

    #[test]
    fn test_custom_base_url() {
        let provider = OpenAiEmbeddingProvider::with_base_url(
            MockHttpClientTrait::new(),
            "sk",
            "http://localhost:8080/",
            "bge-m3",
            1024,
        );

        assert_eq!(provider.embeddings_url(), "http://localhost:8080/v1/embeddings");
        assert_eq!(provider.model(), "bge-m3");
        assert_eq!(provider.dimensions(), 1024);
    }
}
