//! BM25 scoring over a per-knowledge-base statistics snapshot

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::knowledge_base::ChunkId;
use crate::domain::DomainError;

/// BM25 tuning constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term-frequency saturation
    pub k1: f32,
    /// Length normalization
    pub b: f32,
}

impl Bm25Params {
    pub fn new(k1: f32, b: f32) -> Self {
        Self { k1, b }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if !self.k1.is_finite() || self.k1 < 0.0 {
            return Err(DomainError::configuration("bm25 k1 must be non-negative"));
        }
        if !(0.0..=1.0).contains(&self.b) {
            return Err(DomainError::configuration("bm25 b must be within [0, 1]"));
        }
        Ok(())
    }
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// Query-term statistics of one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub chunk_id: ChunkId,
    /// Total number of terms in the chunk
    pub length: usize,
    /// Frequencies of the query terms present in the chunk
    pub term_frequencies: HashMap<String, u32>,
}

/// Committed lexical statistics of a knowledge base, restricted to a query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LexicalSnapshot {
    /// Number of chunks in the knowledge base
    pub chunk_count: usize,
    /// Sum of all chunk lengths
    pub total_length: usize,
    /// Chunks containing each query term
    pub document_frequencies: HashMap<String, usize>,
    /// Chunks containing at least one query term
    pub postings: Vec<Posting>,
}

impl LexicalSnapshot {
    pub fn average_length(&self) -> f32 {
        if self.chunk_count == 0 {
            0.0
        } else {
            self.total_length as f32 / self.chunk_count as f32
        }
    }
}

/// Non-negative inverse document frequency
pub fn idf(chunk_count: usize, document_frequency: usize) -> f32 {
    let n = chunk_count as f32;
    let df = document_frequency as f32;
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}

/// Score every posting against the query terms
///
/// Results are sorted by descending score, ties broken by chunk id. Chunks
/// with a zero score are dropped.
pub fn score(snapshot: &LexicalSnapshot, terms: &[String], params: Bm25Params) -> Vec<(ChunkId, f32)> {
    if snapshot.chunk_count == 0 || terms.is_empty() {
        return Vec::new();
    }

    let avg_len = snapshot.average_length().max(f32::EPSILON);
    let idfs: Vec<(&String, f32)> = terms
        .iter()
        .filter_map(|t| {
            snapshot
                .document_frequencies
                .get(t)
                .map(|df| (t, idf(snapshot.chunk_count, *df)))
        })
        .collect();

    let mut scored: Vec<(ChunkId, f32)> = snapshot
        .postings
        .iter()
        .map(|posting| {
            let norm = 1.0 - params.b + params.b * posting.length as f32 / avg_len;
            let total = idfs
                .iter()
                .filter_map(|(term, idf)| {
                    posting.term_frequencies.get(*term).map(|tf| {
                        let tf = *tf as f32;
                        idf * tf * (params.k1 + 1.0) / (tf + params.k1 * norm)
                    })
                })
                .sum::<f32>();
            (posting.chunk_id.clone(), total)
        })
        .filter(|(_, s)| *s > 0.0)
        .collect();

    sort_by_score(&mut scored);
    scored
}

/// Descending score, ascending chunk id
pub fn sort_by_score(results: &mut [(ChunkId, f32)]) {
    results.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
}
