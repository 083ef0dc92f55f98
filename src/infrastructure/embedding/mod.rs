//! Embedding provider implementations

mod dashscope;
mod factory;
mod http_client;
mod openai;
mod retrying;

pub use dashscope::{DashScopeEmbeddingProvider, DASHSCOPE_MAX_BATCH, DEFAULT_DASHSCOPE_BASE_URL};
pub use factory::{create_embedding_provider, EmbeddingProviderType};
pub use http_client::{HttpClient, HttpClientTrait};
pub use openai::{OpenAiEmbeddingProvider, DEFAULT_OPENAI_BASE_URL};
pub use retrying::{RetryConfig, RetryingEmbeddingProvider};

#[cfg(test)]
pub use http_client::MockHttpClientTrait;
