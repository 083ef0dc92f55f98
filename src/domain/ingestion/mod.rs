//! Document ingestion domain types and traits
//!
//! - `ChunkingStrategy` trait for splitting extracted text into chunks
//! - Stages, configuration and reports for the ingestion pipeline

pub mod chunker;
pub mod pipeline;

pub use chunker::{reassemble, ChunkingConfig, ChunkingStrategy, TextChunk};
pub use pipeline::{
    sanitize_text, IngestDocument, IngestionConfig, IngestionReport, IngestionStage,
    DEFAULT_BATCH_SIZE, DEFAULT_MAX_DOCUMENT_CHARS,
};
