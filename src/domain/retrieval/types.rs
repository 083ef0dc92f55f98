//! Retrieval result types

use serde::{Deserialize, Serialize};

use crate::domain::knowledge_base::{ChunkId, DocumentId, KnowledgeBaseId};

/// A chunk returned by hybrid retrieval, with provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: ChunkId,
    pub knowledge_base_id: KnowledgeBaseId,
    pub knowledge_base_name: String,
    pub document_id: DocumentId,
    pub filename: String,
    pub sequence: usize,
    pub content: String,
    /// Fused reciprocal-rank score
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexical_rank: Option<usize>,
}

/// A scored hit from one index
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk_id: ChunkId,
    pub score: f32,
}

impl From<(ChunkId, f32)> for ScoredChunk {
    fn from((chunk_id, score): (ChunkId, f32)) -> Self {
        Self { chunk_id, score }
    }
}
