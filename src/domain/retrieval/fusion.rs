//! Weighted reciprocal rank fusion

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::knowledge_base::ChunkId;
use crate::domain::DomainError;

/// Default RRF dampening constant
pub const DEFAULT_RRF_CONSTANT: f32 = 60.0;

/// Fusion and candidate-pool settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Constant `c` added to every 1-based rank
    pub rrf_constant: f32,
    /// Candidates per sub-search = max(top_k * multiplier, min_candidates)
    pub candidate_multiplier: usize,
    pub min_candidates: usize,
}

impl FusionConfig {
    pub fn candidate_pool(&self, top_k: usize) -> usize {
        top_k
            .saturating_mul(self.candidate_multiplier)
            .max(self.min_candidates)
            .max(top_k)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if !self.rrf_constant.is_finite() || self.rrf_constant < 0.0 {
            return Err(DomainError::configuration(
                "rrf_constant must be a non-negative number",
            ));
        }
        if self.candidate_multiplier == 0 {
            return Err(DomainError::configuration(
                "candidate_multiplier must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_constant: DEFAULT_RRF_CONSTANT,
            candidate_multiplier: 4,
            min_candidates: 20,
        }
    }
}

/// Reject weights outside [0, 1]
pub fn validate_vector_weight(vector_weight: f32) -> Result<(), DomainError> {
    if !(0.0..=1.0).contains(&vector_weight) {
        return Err(DomainError::configuration(format!(
            "vector_weight must be within [0, 1], got {}",
            vector_weight
        )));
    }
    Ok(())
}

/// A candidate after fusion
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub chunk_id: ChunkId,
    pub score: f32,
    /// 1-based rank in the vector list
    pub vector_rank: Option<usize>,
    /// 1-based rank in the lexical list
    pub lexical_rank: Option<usize>,
}

/// Fuse two ranked lists
///
/// A list a chunk is absent from contributes nothing. Candidates whose only
/// contribution carries zero weight are dropped, so weight 1.0 and 0.0
/// reproduce the vector-only and lexical-only orders.
pub fn fuse(
    vector: &[ChunkId],
    lexical: &[ChunkId],
    vector_weight: f32,
    rrf_constant: f32,
) -> Vec<FusedCandidate> {
    let mut candidates: HashMap<&ChunkId, FusedCandidate> = HashMap::new();

    for (idx, id) in vector.iter().enumerate() {
        let rank = idx + 1;
        let entry = candidates.entry(id).or_insert_with(|| empty(id));
        if entry.vector_rank.is_none() {
            entry.vector_rank = Some(rank);
            entry.score += vector_weight / (rank as f32 + rrf_constant);
        }
    }

    for (idx, id) in lexical.iter().enumerate() {
        let rank = idx + 1;
        let entry = candidates.entry(id).or_insert_with(|| empty(id));
        if entry.lexical_rank.is_none() {
            entry.lexical_rank = Some(rank);
            entry.score += (1.0 - vector_weight) / (rank as f32 + rrf_constant);
        }
    }

    let mut fused: Vec<FusedCandidate> = candidates
        .into_values()
        .filter(|c| c.score > 0.0)
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    fused
}

fn empty(id: &ChunkId) -> FusedCandidate {
    FusedCandidate {
        chunk_id: id.clone(),
        score: 0.0,
        vector_rank: None,
        lexical_rank: None,
    }
}
