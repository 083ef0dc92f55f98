//! DashScope (Alibaba Cloud) native text-embedding provider

use async_trait::async_trait;
use serde::Deserialize;

use super::HttpClientTrait;
use crate::domain::embedding::{Embedding, EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};
use crate::domain::DomainError;

pub const DEFAULT_DASHSCOPE_BASE_URL: &str = "https://dashscope.aliyuncs.com";

/// Largest batch the text-embedding endpoint accepts
pub const DASHSCOPE_MAX_BATCH: usize = 25;

#[derive(Debug)]
pub struct DashScopeEmbeddingProvider<C: HttpClientTrait> {
    client: C,
    headers: Vec<(String, String)>,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl<C: HttpClientTrait> DashScopeEmbeddingProvider<C> {
    pub fn new(
        client: C,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self::with_base_url(client, api_key, DEFAULT_DASHSCOPE_BASE_URL, model, dimensions)
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
        format!(
            "{}/api/v1/services/embeddings/text-embedding/text-embedding",
            self.base_url
        )
    }

    fn build_request(&self, request: &EmbeddingRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model(),
            "input": { "texts": request.texts() },
        });

        if let Some(dims) = request.dimensions() {
            body["parameters"] = serde_json::json!({ "dimension": dims });
        }

        body
    }

    fn parse_response(
        &self,
        model: &str,
        json: serde_json::Value,
    ) -> Result<EmbeddingResponse, DomainError> {
        let response: DashScopeResponse = serde_json::from_value(json).map_err(|e| {
            DomainError::embedding(
                "dashscope",
                format!("Failed to parse embedding response: {}", e),
            )
        })?;

        let embeddings = response
            .output
            .embeddings
            .into_iter()
            .map(|e| Embedding::new(e.text_index, e.embedding))
            .collect();

        let mut parsed = EmbeddingResponse::new(model, embeddings);
        if let Some(usage) = response.usage {
            parsed = parsed.with_total_tokens(usage.total_tokens);
        }
        Ok(parsed)
    }
}

#[async_trait]
impl<C: HttpClientTrait> EmbeddingProvider for DashScopeEmbeddingProvider<C> {
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, DomainError> {
        if request.len() > DASHSCOPE_MAX_BATCH {
            return Err(DomainError::validation(format!(
                "dashscope accepts at most {} texts per request, got {}",
                DASHSCOPE_MAX_BATCH,
                request.len()
            )));
        }

        let body = self.build_request(&request);

        let response = self
            .client
            .post_json(&self.embeddings_url(), &self.headers, &body)
            .await
            .map_err(|e| match e {
                DomainError::Embedding { message, .. } => {
                    DomainError::embedding("dashscope", message)
                }
                other => other,
            })?;

        self.parse_response(request.model(), response)
    }

    fn provider_name(&self) -> &'static str {
        "dashscope"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[derive(Debug, Deserialize)]
struct DashScopeResponse {
    output: DashScopeOutput,
    usage: Option<DashScopeUsage>,
}

#[derive(Debug, Deserialize)]
struct DashScopeOutput {
    embeddings: Vec<DashScopeEmbedding>,
}

#[derive(Debug, Deserialize)]
struct DashScopeEmbedding {
    text_index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct DashScopeUsage {
    total_tokens: u32,
}
