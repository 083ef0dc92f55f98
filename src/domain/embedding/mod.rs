//! Embedding provider domain models and traits

mod provider;
mod request;
mod response;

pub use provider::{validate_batch, EmbeddingProvider};
pub use request::EmbeddingRequest;
pub use response::{cosine_similarity, dot, normalize, Embedding, EmbeddingResponse};

#[cfg(test)]
pub use provider::mock::MockEmbeddingProvider;
