//! Chunking strategy trait and types

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::domain::DomainError;

/// Configuration for chunking, measured in characters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk size
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks
    pub chunk_overlap: usize,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.chunk_size == 0 {
            return Err(DomainError::configuration(
                "chunk_size must be greater than 0",
            ));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(DomainError::configuration(
                "chunk_overlap must be less than chunk_size",
            ));
        }

        Ok(())
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

/// A contiguous fragment of a document's text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Zero-based position within the document
    pub sequence: usize,
    pub content: String,
    /// Character offset where this chunk starts
    pub char_start: usize,
    /// Character offset one past the end of this chunk
    pub char_end: usize,
}

impl TextChunk {
    pub fn new(sequence: usize, content: impl Into<String>, char_start: usize, char_end: usize) -> Self {
        Self {
            sequence,
            content: content.into(),
            char_start,
            char_end,
        }
    }

    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.char_end - self.char_start
    }
}

/// Trait for chunking strategies
///
/// Implementations must be deterministic and must never emit an empty chunk.
pub trait ChunkingStrategy: Send + Sync + Debug {
    /// Split content into ordered chunks
    fn chunk(&self, content: &str, config: &ChunkingConfig) -> Result<Vec<TextChunk>, DomainError>;

    /// Get the strategy name
    fn name(&self) -> &'static str;
}

/// Rebuild the original text from chunks produced with the given overlap
pub fn reassemble(chunks: &[TextChunk], overlap: usize) -> String {
    let mut text = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            text.push_str(&chunk.content);
        } else {
            text.extend(chunk.content.chars().skip(overlap));
        }
    }
    text
}
