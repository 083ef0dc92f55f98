//! Retrieval domain - tokenization, BM25 scoring, rank fusion and query scope

pub mod bm25;
pub mod fusion;
pub mod scope;
pub mod tokenizer;
mod types;

pub use bm25::{Bm25Params, LexicalSnapshot, Posting};
pub use fusion::{fuse, validate_vector_weight, FusedCandidate, FusionConfig};
pub use scope::AuthorizedScope;
pub use tokenizer::{query_terms, term_frequencies, tokenize};
pub use types::{RetrievedChunk, ScoredChunk};
