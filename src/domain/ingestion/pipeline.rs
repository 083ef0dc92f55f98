//! Ingestion pipeline types

use serde::{Deserialize, Serialize};
use std::fmt;

use super::chunker::ChunkingConfig;
use crate::domain::knowledge_base::{DocumentId, KnowledgeBaseId};
use crate::domain::DomainError;

/// Default embedding batch size
pub const DEFAULT_BATCH_SIZE: usize = 25;

/// Default upper bound on extracted document text (characters)
pub const DEFAULT_MAX_DOCUMENT_CHARS: usize = 2 * 1024 * 1024;

/// Where a document is in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStage {
    Received,
    Chunked,
    Embedded,
    Persisted,
    Failed,
}

impl IngestionStage {
    /// Stage reached after this one succeeds
    pub fn next(self) -> Self {
        match self {
            Self::Received => Self::Chunked,
            Self::Chunked => Self::Embedded,
            Self::Embedded => Self::Persisted,
            Self::Persisted | Self::Failed => self,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Persisted | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Chunked => "chunked",
            Self::Embedded => "embedded",
            Self::Persisted => "persisted",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for IngestionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionConfig {
    pub chunking: ChunkingConfig,
    /// Number of chunk texts per embedding request
    pub batch_size: usize,
    /// Documents longer than this are rejected
    pub max_document_chars: usize,
}

impl IngestionConfig {
    pub fn new(chunking: ChunkingConfig) -> Self {
        Self {
            chunking,
            ..Self::default()
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_document_chars(mut self, max: usize) -> Self {
        self.max_document_chars = max;
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        self.chunking.validate()?;

        if self.batch_size == 0 {
            return Err(DomainError::configuration(
                "batch_size must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_document_chars: DEFAULT_MAX_DOCUMENT_CHARS,
        }
    }
}

/// A document to add to (or replace in) a knowledge base
#[derive(Debug, Clone)]
pub struct IngestDocument {
    pub knowledge_base_id: KnowledgeBaseId,
    /// Reusing an existing id replaces that document's chunks
    pub document_id: Option<DocumentId>,
    pub filename: String,
    pub content_type: Option<String>,
    /// Already-extracted plain text
    pub text: String,
}

impl IngestDocument {
    pub fn new(
        knowledge_base_id: KnowledgeBaseId,
        filename: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            knowledge_base_id,
            document_id: None,
            filename: filename.into(),
            content_type: None,
            text: text.into(),
        }
    }

    pub fn with_document_id(mut self, id: DocumentId) -> Self {
        self.document_id = Some(id);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Outcome of a successful ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub document_id: DocumentId,
    pub knowledge_base_id: KnowledgeBaseId,
    pub filename: String,
    pub stage: IngestionStage,
    pub chunks_created: usize,
    /// Chunks of a prior upload that were replaced
    pub chunks_replaced: usize,
    pub text_length: usize,
    pub elapsed_ms: u64,
}

/// Remove characters the stores cannot hold (NUL)
pub fn sanitize_text(text: &str) -> String {
    if text.contains('\0') {
        text.replace('\0', "")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_progression() {
        let mut stage = IngestionStage::Received;
        let mut seen = vec![stage];
        while !stage.is_terminal() {
            stage = stage.next();
            seen.push(stage);
        }

        assert_eq!(
            seen,
            vec![
                IngestionStage::Received,
                IngestionStage::Chunked,
                IngestionStage::Embedded,
                IngestionStage::Persisted
            ]
        );
        assert_eq!(IngestionStage::Failed.next(), IngestionStage::Failed);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(IngestionStage::Embedded.to_string(), "embedded");
        assert_eq!(
            serde_json::to_string(&IngestionStage::Persisted).unwrap(),
            "\"persisted\""
        );
    }

    #[test]
    fn test_config_validation() {
        assert!(IngestionConfig::default().validate().is_ok());
        assert!(IngestionConfig::default().with_batch_size(0).validate().is_err());
        assert!(IngestionConfig::new(ChunkingConfig::new(10, 20)).validate().is_err());
    }

    #[test]
    fn test_sanitize_strips_nul() {
        assert_eq!(sanitize_text("a\0b\0c"), "abc");
        assert_eq!(sanitize_text("clean"), "clean");
    }
}
