//! Retrieval over the knowledge store
//!
//! The vector and lexical indexes are views over [`KnowledgeStore`]; the
//! hybrid retriever queries both and fuses their rankings.
//!
//! [`KnowledgeStore`]: crate::domain::storage::KnowledgeStore

mod hybrid;
mod lexical_index;
mod vector_index;

pub use hybrid::{HybridRetriever, RetrieverConfig};
pub use lexical_index::LexicalIndex;
pub use vector_index::VectorIndex;
