//! Embedding provider construction from configuration

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use super::{
    DashScopeEmbeddingProvider, HttpClient, OpenAiEmbeddingProvider, RetryingEmbeddingProvider,
    DEFAULT_DASHSCOPE_BASE_URL, DEFAULT_OPENAI_BASE_URL,
};
use crate::config::EmbeddingSettings;
use crate::domain::embedding::EmbeddingProvider;
use crate::domain::DomainError;

/// Supported embedding providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    #[serde(alias = "openai-compatible")]
    OpenAi,
    DashScope,
}

impl std::str::FromStr for EmbeddingProviderType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "openai-compatible" => Ok(Self::OpenAi),
            "dashscope" => Ok(Self::DashScope),
            other => Err(DomainError::configuration(format!(
                "Unknown embedding provider: {}",
                other
            ))),
        }
    }
}

/// Build the configured provider, wrapped with retries
pub fn create_embedding_provider(
    settings: &EmbeddingSettings,
) -> Result<Arc<dyn EmbeddingProvider>, DomainError> {
    let api_key = settings.api_key.clone().ok_or_else(|| {
        DomainError::configuration("embedding.api_key is required")
    })?;
    let client = HttpClient::with_timeout(Duration::from_secs(settings.timeout_secs))?;

    let provider: Arc<dyn EmbeddingProvider> = match settings.provider {
        EmbeddingProviderType::OpenAi => Arc::new(OpenAiEmbeddingProvider::with_base_url(
            client,
            api_key,
            settings.base_url.as_deref().unwrap_or(DEFAULT_OPENAI_BASE_URL),
            settings.model.clone(),
            settings.dimensions,
        )),
        EmbeddingProviderType::DashScope => Arc::new(DashScopeEmbeddingProvider::with_base_url(
            client,
            api_key,
            settings
                .base_url
                .as_deref()
                .unwrap_or(DEFAULT_DASHSCOPE_BASE_URL),
            settings.model.clone(),
            settings.dimensions,
        )),
    };

    info!(
        provider = provider.provider_name(),
        model = %settings.model,
        dimensions = settings.dimensions,
        "Embedding provider configured"
    );

    Ok(Arc::new(RetryingEmbeddingProvider::new(
        provider,
        settings.retry_config(),
    )))
}
