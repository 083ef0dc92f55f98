mod common;

use common::{owner, Harness, HashingEmbedder, PARIS};
use kb_retrieval::domain::knowledge_base::ChunkId;
use kb_retrieval::domain::retrieval::{AuthorizedScope, Bm25Params};
use kb_retrieval::domain::DomainError;
use kb_retrieval::infrastructure::retrieval::{LexicalIndex, VectorIndex};

#[tokio::test]
async fn test_paris_end_to_end() {
    let harness = Harness::new(40, 10).await;
    let alice = owner("alice");
    let kb = harness.knowledge_base(&alice, "Geography").await;

    let report = harness.ingest(&alice, &kb, "paris.txt", PARIS).await;
    assert_eq!(report.chunks_created, 2);

    let chunks = harness
        .store()
        .list_chunks(&report.document_id)
        .await
        .unwrap();
    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().all(|c| c.embedding.as_ref().map(Vec::len) == Some(common::DIMS)));

    // the second chunk starts with the tail of the first
    let first: Vec<char> = chunks[0].content.chars().collect();
    let tail: String = first[first.len() - 10..].iter().collect();
    assert!(chunks[1].content.starts_with(&tail));

    let results = harness
        .context
        .retriever
        .retrieve(&alice, "Where is the Eiffel Tower?", &[kb.id().clone()], 1, 0.5)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!(results[0].content.contains("Eiffel Tower"));
    assert_eq!(results[0].filename, "paris.txt");
    assert_eq!(results[0].sequence, 1);
    assert_eq!(results[0].vector_rank, Some(1));
    assert_eq!(results[0].lexical_rank, Some(1));
}

#[tokio::test]
async fn test_isolation_with_identical_content() {
    let harness = Harness::new(40, 10).await;
    let alice = owner("alice");
    let a = harness.knowledge_base(&alice, "A").await;
    let b = harness.knowledge_base(&alice, "B").await;
    harness.ingest(&alice, &a, "same.txt", PARIS).await;
    harness.ingest(&alice, &b, "same.txt", PARIS).await;

    for (target, other) in [(&a, &b), (&b, &a)] {
        let results = harness
            .context
            .retriever
            .retrieve(&alice, "Eiffel Tower Paris", &[target.id().clone()], 10, 0.5)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.knowledge_base_id == *target.id()));
        assert!(results.iter().all(|r| r.knowledge_base_id != *other.id()));
    }
}

#[tokio::test]
async fn test_other_owner_cannot_query() {
    let harness = Harness::new(40, 10).await;
    let alice = owner("alice");
    let kb = harness.knowledge_base(&alice, "Private").await;
    harness.ingest(&alice, &kb, "paris.txt", PARIS).await;

    let err = harness
        .context
        .retriever
        .retrieve(&owner("mallory"), "Paris", &[kb.id().clone()], 5, 0.5)
        .await
        .unwrap_err();

    assert!(err.is_authorization());
}

#[tokio::test]
async fn test_empty_corpus_returns_empty() {
    let harness = Harness::new(40, 10).await;
    let alice = owner("alice");
    let kb = harness.knowledge_base(&alice, "Empty").await;

    let results = harness
        .context
        .retriever
        .retrieve(&alice, "anything at all", &[kb.id().clone()], 5, 0.5)
        .await
        .unwrap();

    assert!(results.is_empty());
}

#[tokio::test]
async fn test_weight_boundaries_reproduce_single_index_order() {
    let harness = Harness::new(60, 10).await;
    let alice = owner("alice");
    let kb = harness.knowledge_base(&alice, "Fruit").await;
    harness
        .ingest(&alice, &kb, "a.txt", "Apples grow on trees in cold orchards.")
        .await;
    harness
        .ingest(&alice, &kb, "b.txt", "Green apples and red apples taste different.")
        .await;
    harness
        .ingest(&alice, &kb, "c.txt", "Bananas grow in warm climates near orchards.")
        .await;
    harness
        .ingest(&alice, &kb, "d.txt", "Orchards need water, sun and patient farmers.")
        .await;

    let query = "apples in orchards";
    let top_k = 3;
    let found = harness
        .store()
        .get_knowledge_bases(&[kb.id().clone()])
        .await
        .unwrap();
    let scope = AuthorizedScope::resolve(&alice, &[kb.id().clone()], found).unwrap();

    let vector_only: Vec<ChunkId> = VectorIndex::new(harness.store().clone())
        .search(&scope, &HashingEmbedder::vector(query), top_k)
        .await
        .unwrap()
        .into_iter()
        .map(|h| h.chunk_id)
        .collect();
    let lexical_only: Vec<ChunkId> = LexicalIndex::new(harness.store().clone(), Bm25Params::default())
        .search(&scope, query, top_k)
        .await
        .unwrap()
        .into_iter()
        .map(|h| h.chunk_id)
        .collect();

    let retrieve = |weight: f32| {
        let retriever = harness.context.retriever.clone();
        let alice = alice.clone();
        let ids = vec![kb.id().clone()];
        async move {
            retriever
                .retrieve(&alice, query, &ids, top_k, weight)
                .await
                .unwrap()
                .into_iter()
                .map(|r| r.chunk_id)
                .collect::<Vec<_>>()
        }
    };

    assert_eq!(retrieve(1.0).await, vector_only);
    assert_eq!(retrieve(0.0).await, lexical_only);
}

#[tokio::test]
async fn test_chunk_first_in_both_lists_stays_first() {
    let harness = Harness::new(40, 10).await;
    let alice = owner("alice");
    let kb = harness.knowledge_base(&alice, "Geography").await;
    harness.ingest(&alice, &kb, "paris.txt", PARIS).await;
    harness
        .ingest(&alice, &kb, "berlin.txt", "Berlin is the capital of Germany.")
        .await;

    for weight in [0.1, 0.3, 0.5, 0.7, 0.9] {
        let results = harness
            .context
            .retriever
            .retrieve(&alice, "Eiffel Tower", &[kb.id().clone()], 3, weight)
            .await
            .unwrap();

        assert_eq!(results[0].vector_rank, Some(1));
        assert_eq!(results[0].lexical_rank, Some(1));
        assert!(results[0].content.contains("Eiffel"));
    }
}

#[tokio::test]
async fn test_invalid_weight_is_configuration_error() {
    let harness = Harness::new(40, 10).await;
    let alice = owner("alice");
    let kb = harness.knowledge_base(&alice, "Geography").await;

    let err = harness
        .context
        .retriever
        .retrieve(&alice, "Paris", &[kb.id().clone()], 5, 1.01)
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::Configuration { .. }));
}
