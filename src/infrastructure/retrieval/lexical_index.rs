//! BM25 lexical index over the knowledge store

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::debug;

use crate::domain::retrieval::bm25::{self, sort_by_score};
use crate::domain::retrieval::{query_terms, AuthorizedScope, Bm25Params, ScoredChunk};
use crate::domain::storage::KnowledgeStore;
use crate::domain::DomainError;

/// BM25 search with statistics read from committed chunks
///
/// Each knowledge base is scored against its own corpus statistics; the
/// per-knowledge-base results are then merged by score.
#[derive(Debug, Clone)]
pub struct LexicalIndex {
    store: Arc<dyn KnowledgeStore>,
    params: Bm25Params,
}

impl LexicalIndex {
    pub fn new(store: Arc<dyn KnowledgeStore>, params: Bm25Params) -> Self {
        Self { store, params }
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }

    /// Up to `k` best-scoring chunks for the query text
    pub async fn search(
        &self,
        scope: &AuthorizedScope,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, DomainError> {
        let terms = query_terms(query);
        if terms.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let snapshots = try_join_all(
            scope
                .knowledge_bases()
                .iter()
                .map(|kb| self.store.lexical_snapshot(kb.id(), &terms)),
        )
        .await?;

        let mut scored: Vec<_> = snapshots
            .iter()
            .flat_map(|snapshot| bm25::score(snapshot, &terms, self.params))
            .collect();
        sort_by_score(&mut scored);
        scored.truncate(k);

        debug!(terms = terms.len(), hits = scored.len(), k, "Lexical search");
        Ok(scored.into_iter().map(ScoredChunk::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge_base::{
        ChunkId, Document, DocumentId, KnowledgeBase, NewChunk, OwnerId,
    };
    use crate::domain::retrieval::term_frequencies;
    use crate::infrastructure::storage::SqliteKnowledgeStore;

    async fn seed(
        store: &Arc<dyn KnowledgeStore>,
        owner: &OwnerId,
        texts: &[(&str, &str)],
    ) -> KnowledgeBase {
        let kb = KnowledgeBase::new(owner.clone(), "Docs").unwrap();
        store.create_knowledge_base(&kb).await.unwrap();

        let document = Document::new(DocumentId::generate(), kb.id().clone(), "doc.txt");
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(i, (id, text))| NewChunk {
                id: ChunkId::new(*id).unwrap(),
                sequence: i,
                content: text.to_string(),
                embedding: vec![1.0, 0.0],
                terms: term_frequencies(text),
            })
            .collect();
        store.replace_document(&document, chunks).await.unwrap();
        kb
    }

    async fn store() -> Arc<dyn KnowledgeStore> {
        Arc::new(SqliteKnowledgeStore::open_in_memory(2).await.unwrap())
    }

    #[tokio::test]
    async fn test_ranks_matching_chunks() {
        let store = store().await;
        let owner = OwnerId::new("alice").unwrap();
        let kb = seed(
            &store,
            &owner,
            &[
                ("a", "the eiffel tower is in paris"),
                ("b", "berlin has a famous gate"),
                ("c", "paris paris paris"),
            ],
        )
        .await;
        let scope = AuthorizedScope::resolve(&owner, &[kb.id().clone()], vec![kb]).unwrap();

        let index = LexicalIndex::new(store, Bm25Params::default());
        let hits = index.search(&scope, "Paris", 10).await.unwrap();

        let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert!(hits.iter().all(|h| h.score > 0.0));
    }

    #[tokio::test]
    async fn test_empty_query_and_empty_corpus() {
        let store = store().await;
        let owner = OwnerId::new("alice").unwrap();
        let kb = KnowledgeBase::new(owner.clone(), "Empty").unwrap();
        store.create_knowledge_base(&kb).await.unwrap();
        let scope = AuthorizedScope::resolve(&owner, &[kb.id().clone()], vec![kb]).unwrap();
        let index = LexicalIndex::new(store, Bm25Params::default());

        assert!(index.search(&scope, "paris", 5).await.unwrap().is_empty());
        assert!(index.search(&scope, "  !? ", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_merges_knowledge_bases_and_truncates() {
        let store = store().await;
        let owner = OwnerId::new("alice").unwrap();
        let kb1 = seed(&store, &owner, &[("a1", "rust compiler"), ("a2", "rust")]).await;
        let kb2 = seed(&store, &owner, &[("b1", "rust borrow checker"), ("b2", "python")]).await;
        let ids = vec![kb1.id().clone(), kb2.id().clone()];
        let scope = AuthorizedScope::resolve(&owner, &ids, vec![kb1, kb2]).unwrap();

        let index = LexicalIndex::new(store, Bm25Params::default());
        let all = index.search(&scope, "rust", 10).await.unwrap();
        let top = index.search(&scope, "rust", 2).await.unwrap();

        assert_eq!(all.len(), 3);
        assert_eq!(top.len(), 2);
        assert_eq!(top, all[..2].to_vec());
        assert!(all.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_cjk_query_matches_characters() {
        let store = store().await;
        let owner = OwnerId::new("alice").unwrap();
        let kb = seed(&store, &owner, &[("z1", "巴黎是法国的首都"), ("z2", "柏林是德国的首都")]).await;
        let scope = AuthorizedScope::resolve(&owner, &[kb.id().clone()], vec![kb]).unwrap();

        let index = LexicalIndex::new(store, Bm25Params::default());
        let hits = index.search(&scope, "巴黎", 5).await.unwrap();

        assert_eq!(hits[0].chunk_id.as_str(), "z1");
        assert_eq!(hits.len(), 1);
    }
}
