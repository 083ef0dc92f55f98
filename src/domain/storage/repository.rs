//! Knowledge store capability trait

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::knowledge_base::{
    ChunkId, Document, DocumentId, KnowledgeBase, KnowledgeBaseId, NewChunk, OwnerId, StoredChunk,
};
use crate::domain::retrieval::LexicalSnapshot;
use crate::domain::DomainError;

/// Persistence of knowledge bases, documents, chunks, vectors and term statistics
///
/// Implementations must behave identically: retrieval and ingestion never
/// know which one is active. Stores normalize vectors to unit length on write
/// and on query. A vector whose length differs from
/// [`KnowledgeStore::dimensions`] is rejected with
/// [`DomainError::DimensionMismatch`]; one with non-finite components or
/// zero norm with [`DomainError::Storage`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KnowledgeStore: Send + Sync + Debug {
    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;

    /// Fixed embedding dimensionality
    fn dimensions(&self) -> usize;

    // Knowledge bases

    /// Insert a knowledge base; `Conflict` if the id exists
    async fn create_knowledge_base(&self, knowledge_base: &KnowledgeBase) -> Result<(), DomainError>;

    async fn get_knowledge_base(
        &self,
        id: &KnowledgeBaseId,
    ) -> Result<Option<KnowledgeBase>, DomainError>;

    /// Fetch the subset of `ids` that exist, regardless of owner
    async fn get_knowledge_bases(
        &self,
        ids: &[KnowledgeBaseId],
    ) -> Result<Vec<KnowledgeBase>, DomainError>;

    /// Knowledge bases of an owner, newest first
    async fn list_knowledge_bases(&self, owner: &OwnerId)
    -> Result<Vec<KnowledgeBase>, DomainError>;

    /// Owners with at least one knowledge base
    async fn list_owners(&self) -> Result<Vec<OwnerId>, DomainError>;

    /// Persist name and description; `NotFound` if missing
    async fn update_knowledge_base(&self, knowledge_base: &KnowledgeBase) -> Result<(), DomainError>;

    /// Delete a knowledge base with its documents and chunks
    async fn delete_knowledge_base(&self, id: &KnowledgeBaseId) -> Result<bool, DomainError>;

    // Documents

    async fn get_document(&self, id: &DocumentId) -> Result<Option<Document>, DomainError>;

    async fn get_documents(&self, ids: &[DocumentId]) -> Result<Vec<Document>, DomainError>;

    /// Documents of a knowledge base, newest first
    async fn list_documents(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
    ) -> Result<Vec<Document>, DomainError>;

    /// Delete a document with its chunks
    async fn delete_document(&self, id: &DocumentId) -> Result<bool, DomainError>;

    /// Write a document and its complete chunk set in one transaction
    ///
    /// Any prior chunks of the document are removed in the same
    /// transaction. Returns the number of chunks replaced.
    async fn replace_document(
        &self,
        document: &Document,
        chunks: Vec<NewChunk>,
    ) -> Result<usize, DomainError>;

    // Chunks and vectors

    /// Chunks of a document ordered by sequence, with embeddings
    async fn list_chunks(&self, document_id: &DocumentId) -> Result<Vec<StoredChunk>, DomainError>;

    /// Chunks by id, without embeddings
    async fn get_chunks(&self, ids: &[ChunkId]) -> Result<Vec<StoredChunk>, DomainError>;

    async fn count_chunks(&self, knowledge_base_id: &KnowledgeBaseId) -> Result<usize, DomainError>;

    /// Remove every chunk of a document, keeping the document record
    async fn delete_document_chunks(&self, document_id: &DocumentId) -> Result<usize, DomainError>;

    /// Replace the vector of an existing chunk
    async fn upsert_vector(&self, chunk_id: &ChunkId, vector: Vec<f32>) -> Result<(), DomainError>;

    /// Nearest chunks by cosine similarity within the given knowledge bases
    ///
    /// Sorted by descending similarity, ties by ascending chunk id.
    async fn vector_search(
        &self,
        query: &[f32],
        limit: usize,
        knowledge_base_ids: &[KnowledgeBaseId],
    ) -> Result<Vec<(ChunkId, f32)>, DomainError>;

    /// Committed term statistics of one knowledge base for the given terms
    async fn lexical_snapshot(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        terms: &[String],
    ) -> Result<LexicalSnapshot, DomainError>;

    /// Release connections; in-flight calls finish first
    async fn close(&self);
}

/// Reject vectors of the wrong dimensionality, non-finite components or zero norm
///
/// A zero vector has no direction: cosine against it is undefined.
pub fn check_dimensions(expected: usize, vector: &[f32]) -> Result<(), DomainError> {
    if vector.len() != expected {
        return Err(DomainError::dimension_mismatch(expected, vector.len()));
    }
    if let Some(position) = vector.iter().position(|x| !x.is_finite()) {
        return Err(DomainError::storage(format!(
            "embedding component {} is not finite",
            position
        )));
    }
    if vector.iter().all(|x| *x == 0.0) {
        return Err(DomainError::storage("embedding has zero norm"));
    }
    Ok(())
}

/// Sequences must be dense and zero-based, ids unique
pub fn validate_chunk_set(chunks: &[NewChunk], dimensions: usize) -> Result<(), DomainError> {
    let mut seen = std::collections::HashSet::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if chunk.sequence != i {
            return Err(DomainError::validation(format!(
                "chunk sequence must be dense and zero-based: expected {}, got {}",
                i, chunk.sequence
            )));
        }
        if !seen.insert(&chunk.id) {
            return Err(DomainError::validation(format!(
                "duplicate chunk id {}",
                chunk.id
            )));
        }
        check_dimensions(dimensions, &chunk.embedding)?;
    }
    Ok(())
}
