//! Embedding response types and vector math

use serde::{Deserialize, Serialize};

/// A single embedding vector with its position in the batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    index: usize,
    embedding: Vec<f32>,
}

impl Embedding {
    pub fn new(index: usize, embedding: Vec<f32>) -> Self {
        Self { index, embedding }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn vector(&self) -> &[f32] {
        &self.embedding
    }

    pub fn dimensions(&self) -> usize {
        self.embedding.len()
    }

    pub fn into_vector(self) -> Vec<f32> {
        self.embedding
    }
}

/// Response from an embedding provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    model: String,
    data: Vec<Embedding>,
    /// Tokens billed by the provider, when reported
    total_tokens: Option<u32>,
}

impl EmbeddingResponse {
    pub fn new(model: impl Into<String>, data: Vec<Embedding>) -> Self {
        Self {
            model: model.into(),
            data,
            total_tokens: None,
        }
    }

    pub fn with_total_tokens(mut self, tokens: u32) -> Self {
        self.total_tokens = Some(tokens);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn embeddings(&self) -> &[Embedding] {
        &self.data
    }

    pub fn total_tokens(&self) -> Option<u32> {
        self.total_tokens
    }

    /// Vectors ordered by batch index
    ///
    /// The indices must be exactly `0..expected`, each appearing once.
    pub fn into_ordered_vectors(self, expected: usize) -> Result<Vec<Vec<f32>>, String> {
        if self.data.len() != expected {
            return Err(format!(
                "expected {} embeddings, got {}",
                expected,
                self.data.len()
            ));
        }

        let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
        for embedding in self.data {
            let index = embedding.index();
            match slots.get_mut(index) {
                Some(slot @ None) => *slot = Some(embedding.into_vector()),
                Some(Some(_)) => return Err(format!("duplicate embedding index {}", index)),
                None => {
                    return Err(format!(
                        "embedding index {} out of range for a batch of {}",
                        index, expected
                    ));
                }
            }
        }

        // every slot is filled: `expected` distinct in-range indices
        Ok(slots.into_iter().flatten().collect())
    }
}

/// Calculate cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product = dot(a, b);
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Inner product; equals cosine similarity for unit vectors
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale a vector to unit length; zero vectors are left untouched
pub fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = l2_norm(&v);
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let similarity = cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]);
        assert!((similarity - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let similarity = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!(similarity.abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let similarity = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((similarity + 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_normalize_yields_unit_length() {
        let v = normalize(vec![3.0, 4.0]);

        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert!((dot(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector() {
        assert_eq!(normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_dot_matches_cosine_for_unit_vectors() {
        let a = normalize(vec![1.0, 2.0, 3.0]);
        let b = normalize(vec![2.0, 1.0, 0.5]);

        assert!((dot(&a, &b) - cosine_similarity(&a, &b)).abs() < 1e-6);
    }

    #[test]
    fn test_response_orders_by_index() {
        let response = EmbeddingResponse::new(
            "m",
            vec![Embedding::new(1, vec![0.0, 1.0]), Embedding::new(0, vec![1.0, 0.0])],
        );

        let vectors = response.into_ordered_vectors(2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_response_indices_must_cover_batch() {
        let response = |indices: &[usize]| {
            EmbeddingResponse::new(
                "m",
                indices
                    .iter()
                    .map(|i| Embedding::new(*i, vec![*i as f32 + 1.0, 0.0]))
                    .collect(),
            )
        };

        assert!(response(&[0, 0]).into_ordered_vectors(2).unwrap_err().contains("duplicate"));
        assert!(response(&[0, 2]).into_ordered_vectors(2).unwrap_err().contains("out of range"));
        assert!(response(&[0]).into_ordered_vectors(2).unwrap_err().contains("expected 2"));
        assert_eq!(response(&[]).into_ordered_vectors(0).unwrap().len(), 0);
    }
}
