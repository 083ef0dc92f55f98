//! Storage domain - backend-independent persistence contract

mod repository;

pub use repository::{check_dimensions, validate_chunk_set, KnowledgeStore};

#[cfg(test)]
pub use repository::MockKnowledgeStore;
