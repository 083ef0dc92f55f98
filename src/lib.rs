//! Knowledge base hybrid retrieval
//!
//! Tenant-owned knowledge bases of chunked documents, searchable through:
//! - Dense vector similarity over provider embeddings (OpenAI-compatible, DashScope)
//! - BM25 lexical scoring over committed term statistics
//! - Weighted reciprocal rank fusion of both rankings
//!
//! Storage is either an embedded SQLite file or PostgreSQL with pgvector.

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;

use domain::embedding::EmbeddingProvider;
use domain::storage::KnowledgeStore;
use infrastructure::{
    embedding::create_embedding_provider,
    ingestion::{BoundaryChunker, IngestionPipeline},
    retrieval::HybridRetriever,
    services::KnowledgeBaseService,
    storage::StorageFactory,
};
use tracing::info;

/// Process-wide handles, built once at startup and passed explicitly
#[derive(Debug, Clone)]
pub struct AppContext {
    pub store: Arc<dyn KnowledgeStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub pipeline: Arc<IngestionPipeline>,
    pub retriever: Arc<HybridRetriever>,
    pub knowledge_bases: Arc<KnowledgeBaseService>,
}

impl AppContext {
    /// Connect storage and the embedding provider described by `config`
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let embedder = create_embedding_provider(&config.embedding)?;
        let store = StorageFactory::from_settings(&config.storage, config.embedding.dimensions)
            .await?;

        Self::with_components(config, store, embedder)
    }

    /// Assemble the context around an existing store and embedder
    pub fn with_components(
        config: &AppConfig,
        store: Arc<dyn KnowledgeStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> anyhow::Result<Self> {
        let pipeline = IngestionPipeline::new(
            store.clone(),
            embedder.clone(),
            Arc::new(BoundaryChunker::new()),
            config.ingestion_config(),
        )?;
        let retriever = HybridRetriever::new(
            store.clone(),
            embedder.clone(),
            config.retrieval.retriever_config(),
        )?;

        info!(
            backend = store.backend_name(),
            provider = embedder.provider_name(),
            model = embedder.model(),
            "Application context ready"
        );

        Ok(Self {
            knowledge_bases: Arc::new(KnowledgeBaseService::new(store.clone())),
            pipeline: Arc::new(pipeline),
            retriever: Arc::new(retriever),
            store,
            embedder,
        })
    }

    /// Drain and close storage connections
    pub async fn shutdown(self) {
        info!(backend = self.store.backend_name(), "Shutting down");
        self.store.close().await;
    }
}
