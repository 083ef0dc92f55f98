//! Domain layer - Core entities, contracts and retrieval algorithms

pub mod embedding;
pub mod error;
pub mod ingestion;
pub mod knowledge_base;
pub mod retrieval;
pub mod storage;

pub use embedding::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};
pub use error::DomainError;
pub use ingestion::{
    ChunkingConfig, ChunkingStrategy, IngestDocument, IngestionConfig, IngestionReport,
    IngestionStage, TextChunk,
};
pub use knowledge_base::{
    ChunkId, Document, DocumentId, KnowledgeBase, KnowledgeBaseId, NewChunk, OwnerId, StoredChunk,
};
pub use retrieval::{AuthorizedScope, Bm25Params, FusionConfig, RetrievedChunk};
pub use storage::KnowledgeStore;
