//! Document and chunk entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{ChunkId, DocumentId, KnowledgeBaseId};

/// A document stored in a knowledge base
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    id: DocumentId,
    knowledge_base_id: KnowledgeBaseId,
    filename: String,
    content_type: Option<String>,
    /// Length of the extracted text in characters
    text_length: usize,
    chunk_count: usize,
    created_at: DateTime<Utc>,
}

impl Document {
    /// Create a new document record
    pub fn new(
        id: DocumentId,
        knowledge_base_id: KnowledgeBaseId,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            id,
            knowledge_base_id,
            filename: filename.into(),
            content_type: None,
            text_length: 0,
            chunk_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_text_length(mut self, length: usize) -> Self {
        self.text_length = length;
        self
    }

    pub fn with_chunk_count(mut self, count: usize) -> Self {
        self.chunk_count = count;
        self
    }

    /// Set timestamp (for loading from storage)
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    // Getters

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn knowledge_base_id(&self) -> &KnowledgeBaseId {
        &self.knowledge_base_id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn text_length(&self) -> usize {
        self.text_length
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// A persisted chunk of a document
///
/// Chunks are immutable once created. A re-upload produces a new set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub knowledge_base_id: KnowledgeBaseId,
    /// Zero-based, dense position within the document
    pub sequence: usize,
    pub content: String,
    /// Number of lexical terms in the content
    pub term_count: usize,
    /// Unit-length embedding; absent when only metadata was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// A chunk about to be written, with everything the indexes need
#[derive(Debug, Clone, PartialEq)]
pub struct NewChunk {
    pub id: ChunkId,
    pub sequence: usize,
    pub content: String,
    pub embedding: Vec<f32>,
    /// Term frequencies, sorted by term
    pub terms: Vec<(String, u32)>,
}

impl NewChunk {
    /// Total number of terms (the BM25 document length)
    pub fn term_count(&self) -> usize {
        self.terms.iter().map(|(_, tf)| *tf as usize).sum()
    }
}
