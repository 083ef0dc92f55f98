//! Ingestion pipeline service

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info};

use crate::domain::embedding::EmbeddingProvider;
use crate::domain::ingestion::{
    sanitize_text, ChunkingStrategy, IngestDocument, IngestionConfig, IngestionReport,
    IngestionStage, TextChunk,
};
use crate::domain::knowledge_base::{
    ChunkId, Document, DocumentId, KnowledgeBase, KnowledgeBaseId, NewChunk, OwnerId,
};
use crate::domain::retrieval::term_frequencies;
use crate::domain::storage::KnowledgeStore;
use crate::domain::DomainError;
use crate::infrastructure::observability::{record_ingestion, IngestionMetricParams};

/// Turns extracted document text into persisted, searchable chunks
///
/// A document moves `received → chunked → embedded → persisted`. Nothing is
/// written until every chunk has a vector, and the chunk set is swapped in a
/// single store transaction, so a failure at any stage leaves the previous
/// state of the knowledge base untouched.
#[derive(Debug, Clone)]
pub struct IngestionPipeline {
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Arc<dyn ChunkingStrategy>,
    config: IngestionConfig,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunker: Arc<dyn ChunkingStrategy>,
        config: IngestionConfig,
    ) -> Result<Self, DomainError> {
        config.validate()?;

        if embedder.dimensions() != store.dimensions() {
            return Err(DomainError::configuration(format!(
                "embedding provider returns {}-dimensional vectors but the store holds {}",
                embedder.dimensions(),
                store.dimensions()
            )));
        }

        Ok(Self {
            store,
            embedder,
            chunker,
            config,
        })
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    /// Ingest (or re-ingest) one document on behalf of `owner`
    pub async fn ingest(
        &self,
        owner: &OwnerId,
        input: IngestDocument,
    ) -> Result<IngestionReport, DomainError> {
        let started = Instant::now();
        let knowledge_base = self.authorize(owner, &input.knowledge_base_id).await?;

        if input.filename.trim().is_empty() {
            return Err(DomainError::validation("filename cannot be empty"));
        }

        let text = sanitize_text(&input.text);
        let text_length = text.chars().count();
        if text_length > self.config.max_document_chars {
            return Err(DomainError::validation(format!(
                "document '{}' has {} characters, limit is {}",
                input.filename, text_length, self.config.max_document_chars
            )));
        }

        let document_id = input.document_id.clone().unwrap_or_else(DocumentId::generate);
        let filename = input.filename.clone();
        let mut stage = IngestionStage::Received;

        debug!(
            kb_id = %knowledge_base.id(),
            document_id = %document_id,
            filename = %filename,
            text_length,
            "Document received"
        );

        let result = self
            .run(&input, &document_id, &text, text_length, &mut stage)
            .await;

        match result {
            Ok((chunks_created, chunks_replaced)) => {
                record_ingestion(IngestionMetricParams {
                    stage: stage.as_str(),
                    success: true,
                    chunks: chunks_created,
                    duration: started.elapsed(),
                });
                let elapsed_ms = started.elapsed().as_millis() as u64;
                info!(
                    kb_id = %knowledge_base.id(),
                    document_id = %document_id,
                    filename = %filename,
                    chunks = chunks_created,
                    replaced = chunks_replaced,
                    elapsed_ms,
                    "Document ingested"
                );

                Ok(IngestionReport {
                    document_id,
                    knowledge_base_id: knowledge_base.id().clone(),
                    filename,
                    stage,
                    chunks_created,
                    chunks_replaced,
                    text_length,
                    elapsed_ms,
                })
            }
            Err(e) => {
                // `stage` is the last stage reached; the failure happened moving past it
                let failed_at = stage.next();
                record_ingestion(IngestionMetricParams {
                    stage: failed_at.as_str(),
                    success: false,
                    chunks: 0,
                    duration: started.elapsed(),
                });
                error!(
                    kb_id = %knowledge_base.id(),
                    document_id = %document_id,
                    filename = %filename,
                    stage = %failed_at,
                    error = %e,
                    "Document ingestion failed"
                );
                Err(DomainError::ingestion(filename, failed_at, e))
            }
        }
    }

    async fn run(
        &self,
        input: &IngestDocument,
        document_id: &DocumentId,
        text: &str,
        text_length: usize,
        stage: &mut IngestionStage,
    ) -> Result<(usize, usize), DomainError> {
        let pieces = self.chunker.chunk(text, &self.config.chunking)?;
        *stage = IngestionStage::Chunked;
        debug!(document_id = %document_id, chunks = pieces.len(), chunker = self.chunker.name(), "Document chunked");

        let vectors = self.embed_chunks(&pieces).await?;
        *stage = IngestionStage::Embedded;

        let chunks: Vec<NewChunk> = pieces
            .into_iter()
            .zip(vectors)
            .map(|(piece, embedding)| NewChunk {
                id: ChunkId::generate(),
                sequence: piece.sequence,
                terms: term_frequencies(&piece.content),
                content: piece.content,
                embedding,
            })
            .collect();
        let chunks_created = chunks.len();

        let mut document = Document::new(
            document_id.clone(),
            input.knowledge_base_id.clone(),
            input.filename.clone(),
        )
        .with_text_length(text_length)
        .with_chunk_count(chunks_created)
        .with_created_at(Utc::now());
        if let Some(ref content_type) = input.content_type {
            document = document.with_content_type(content_type.clone());
        }

        let chunks_replaced = self.store.replace_document(&document, chunks).await?;
        *stage = IngestionStage::Persisted;

        Ok((chunks_created, chunks_replaced))
    }

    /// Embed chunk texts in batches; all batches must succeed
    async fn embed_chunks(&self, pieces: &[TextChunk]) -> Result<Vec<Vec<f32>>, DomainError> {
        let mut vectors = Vec::with_capacity(pieces.len());

        for batch in pieces.chunks(self.config.batch_size) {
            let texts = batch.iter().map(|p| p.content.clone()).collect();
            vectors.extend(self.embedder.embed_batch(texts).await?);
        }

        debug!(vectors = vectors.len(), provider = self.embedder.provider_name(), "Chunks embedded");
        Ok(vectors)
    }

    /// Remove a document and its chunks
    ///
    /// Returns `false` both when the document does not exist and when it
    /// belongs to another owner's knowledge base.
    pub async fn delete_document(
        &self,
        owner: &OwnerId,
        document_id: &DocumentId,
    ) -> Result<bool, DomainError> {
        let Some(document) = self.store.get_document(document_id).await? else {
            return Ok(false);
        };
        if self.authorize(owner, document.knowledge_base_id()).await.is_err() {
            debug!(owner = %owner, document_id = %document_id, "Delete of inaccessible document ignored");
            return Ok(false);
        }

        let deleted = self.store.delete_document(document_id).await?;
        info!(
            kb_id = %document.knowledge_base_id(),
            document_id = %document_id,
            "Document deleted"
        );
        Ok(deleted)
    }

    async fn authorize(
        &self,
        owner: &OwnerId,
        knowledge_base_id: &KnowledgeBaseId,
    ) -> Result<KnowledgeBase, DomainError> {
        match self.store.get_knowledge_base(knowledge_base_id).await? {
            Some(kb) if kb.is_owned_by(owner) => Ok(kb),
            _ => Err(DomainError::authorization(format!(
                "knowledge base '{}' is not accessible",
                knowledge_base_id
            ))),
        }
    }
}
