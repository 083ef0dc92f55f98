//! Document ingestion infrastructure
//!
//! Boundary-aware chunking and the pipeline that embeds and persists chunks.

mod chunker;
mod pipeline;

pub use chunker::BoundaryChunker;
pub use pipeline::IngestionPipeline;
