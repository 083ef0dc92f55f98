//! Vector index over the knowledge store

use std::sync::Arc;

use tracing::debug;

use crate::domain::knowledge_base::{ChunkId, DocumentId};
use crate::domain::retrieval::{AuthorizedScope, ScoredChunk};
use crate::domain::storage::KnowledgeStore;
use crate::domain::DomainError;

/// Cosine-similarity search restricted to an authorized scope
#[derive(Debug, Clone)]
pub struct VectorIndex {
    store: Arc<dyn KnowledgeStore>,
}

impl VectorIndex {
    pub fn new(store: Arc<dyn KnowledgeStore>) -> Self {
        Self { store }
    }

    /// Replace the vector of an existing chunk
    pub async fn upsert(&self, chunk_id: &ChunkId, vector: Vec<f32>) -> Result<(), DomainError> {
        self.store.upsert_vector(chunk_id, vector).await
    }

    /// Remove every vector belonging to a document
    pub async fn delete(&self, document_id: &DocumentId) -> Result<usize, DomainError> {
        self.store.delete_document_chunks(document_id).await
    }

    /// Up to `k` most similar chunks, highest similarity first
    pub async fn search(
        &self,
        scope: &AuthorizedScope,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, DomainError> {
        let hits = self.store.vector_search(query, k, &scope.ids()).await?;
        debug!(hits = hits.len(), k, "Vector search");

        Ok(hits.into_iter().map(ScoredChunk::from).collect())
    }
}
