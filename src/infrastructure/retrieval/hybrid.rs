//! Hybrid retrieval: vector and BM25 search fused by weighted RRF

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::{LexicalIndex, VectorIndex};
use crate::domain::embedding::EmbeddingProvider;
use crate::domain::knowledge_base::{ChunkId, DocumentId, KnowledgeBaseId, OwnerId};
use crate::domain::retrieval::{
    fuse, validate_vector_weight, AuthorizedScope, Bm25Params, FusedCandidate, FusionConfig,
    RetrievedChunk, ScoredChunk,
};
use crate::domain::storage::KnowledgeStore;
use crate::domain::DomainError;
use crate::infrastructure::observability::{record_retrieval, RetrievalMetricParams};

const QUERY_LOG_CHARS: usize = 100;

/// Retriever tuning
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RetrieverConfig {
    pub fusion: FusionConfig,
    pub bm25: Bm25Params,
    /// Serve results from one index when the other fails
    pub degrade_to_single_index: bool,
}

impl RetrieverConfig {
    pub fn validate(&self) -> Result<(), DomainError> {
        self.fusion.validate()?;
        self.bm25.validate()
    }
}

/// Combines semantic and lexical search over authorized knowledge bases
#[derive(Debug, Clone)]
pub struct HybridRetriever {
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    vector: VectorIndex,
    lexical: LexicalIndex,
    config: RetrieverConfig,
}

impl HybridRetriever {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RetrieverConfig,
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
            vector: VectorIndex::new(store.clone()),
            lexical: LexicalIndex::new(store.clone(), config.bm25),
            store,
            embedder,
            config,
        })
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Best `top_k` chunks for `query` across the caller's knowledge bases
    ///
    /// `vector_weight` of 1.0 ranks purely by embedding similarity, 0.0
    /// purely by BM25.
    pub async fn retrieve(
        &self,
        owner: &OwnerId,
        query: &str,
        knowledge_base_ids: &[KnowledgeBaseId],
        top_k: usize,
        vector_weight: f32,
    ) -> Result<Vec<RetrievedChunk>, DomainError> {
        let started = Instant::now();
        let result = self
            .run(owner, query, knowledge_base_ids, top_k, vector_weight)
            .await;

        record_retrieval(RetrievalMetricParams {
            knowledge_bases: knowledge_base_ids.len(),
            results: result.as_ref().map_or(0, Vec::len),
            vector_weight,
            duration: started.elapsed(),
            success: result.is_ok(),
        });
        result
    }

    async fn run(
        &self,
        owner: &OwnerId,
        query: &str,
        knowledge_base_ids: &[KnowledgeBaseId],
        top_k: usize,
        vector_weight: f32,
    ) -> Result<Vec<RetrievedChunk>, DomainError> {
        validate_vector_weight(vector_weight)?;

        if query.trim().is_empty() {
            return Err(DomainError::validation("query cannot be empty"));
        }

        let found = self.store.get_knowledge_bases(knowledge_base_ids).await?;
        let scope = AuthorizedScope::resolve(owner, knowledge_base_ids, found)?;

        if top_k == 0 {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let pool = self.config.fusion.candidate_pool(top_k);
        let (vector_hits, lexical_hits) = self.search_both(&scope, query, pool).await?;

        let vector_ids: Vec<ChunkId> = vector_hits.into_iter().map(|h| h.chunk_id).collect();
        let lexical_ids: Vec<ChunkId> = lexical_hits.into_iter().map(|h| h.chunk_id).collect();

        let mut fused = fuse(
            &vector_ids,
            &lexical_ids,
            vector_weight,
            self.config.fusion.rrf_constant,
        );
        fused.truncate(top_k);

        let results = self.hydrate(&scope, fused).await?;

        info!(
            owner = %owner,
            query = %preview(query),
            knowledge_bases = scope.knowledge_bases().len(),
            vector_candidates = vector_ids.len(),
            lexical_candidates = lexical_ids.len(),
            results = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Retrieval completed"
        );

        Ok(results)
    }

    async fn search_both(
        &self,
        scope: &AuthorizedScope,
        query: &str,
        pool: usize,
    ) -> Result<(Vec<ScoredChunk>, Vec<ScoredChunk>), DomainError> {
        let vector = async {
            let embedding = self.embedder.embed_text(query).await?;
            self.vector.search(scope, &embedding, pool).await
        };
        let lexical = self.lexical.search(scope, query, pool);

        if !self.config.degrade_to_single_index {
            return tokio::try_join!(vector, lexical);
        }

        match tokio::join!(vector, lexical) {
            (Ok(v), Ok(l)) => Ok((v, l)),
            (Err(e), Ok(l)) => {
                warn!(error = %e, "Vector search failed, serving lexical results only");
                Ok((Vec::new(), l))
            }
            (Ok(v), Err(e)) => {
                warn!(error = %e, "Lexical search failed, serving vector results only");
                Ok((v, Vec::new()))
            }
            (Err(vector_err), Err(lexical_err)) => {
                warn!(error = %lexical_err, "Lexical search failed");
                Err(vector_err)
            }
        }
    }

    /// Attach chunk text and provenance, preserving fused order
    async fn hydrate(
        &self,
        scope: &AuthorizedScope,
        fused: Vec<FusedCandidate>,
    ) -> Result<Vec<RetrievedChunk>, DomainError> {
        if fused.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<ChunkId> = fused.iter().map(|c| c.chunk_id.clone()).collect();
        let chunks: HashMap<ChunkId, _> = self
            .store
            .get_chunks(&ids)
            .await?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        let mut document_ids: Vec<DocumentId> =
            chunks.values().map(|c| c.document_id.clone()).collect();
        document_ids.sort();
        document_ids.dedup();
        let documents: HashMap<DocumentId, _> = self
            .store
            .get_documents(&document_ids)
            .await?
            .into_iter()
            .map(|d| (d.id().clone(), d))
            .collect();

        let mut results = Vec::with_capacity(fused.len());
        for candidate in fused {
            let Some(chunk) = chunks.get(&candidate.chunk_id) else {
                debug!(chunk_id = %candidate.chunk_id, "Chunk removed during retrieval");
                continue;
            };
            let (Some(document), Some(kb)) = (
                documents.get(&chunk.document_id),
                scope.get(&chunk.knowledge_base_id),
            ) else {
                continue;
            };

            results.push(RetrievedChunk {
                chunk_id: candidate.chunk_id,
                knowledge_base_id: kb.id().clone(),
                knowledge_base_name: kb.name().to_string(),
                document_id: document.id().clone(),
                filename: document.filename().to_string(),
                sequence: chunk.sequence,
                content: chunk.content.clone(),
                score: candidate.score,
                vector_rank: candidate.vector_rank,
                lexical_rank: candidate.lexical_rank,
            });
        }

        Ok(results)
    }
}

fn preview(query: &str) -> String {
    if query.chars().count() <= QUERY_LOG_CHARS {
        query.to_string()
    } else {
        let mut short: String = query.chars().take(QUERY_LOG_CHARS).collect();
        short.push('…');
        short
    }
}
