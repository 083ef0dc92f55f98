#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use kb_retrieval::domain::embedding::{
    Embedding, EmbeddingProvider, EmbeddingRequest, EmbeddingResponse,
};
use kb_retrieval::domain::ingestion::IngestDocument;
use kb_retrieval::domain::knowledge_base::{KnowledgeBase, OwnerId};
use kb_retrieval::domain::retrieval::tokenize;
use kb_retrieval::domain::storage::KnowledgeStore;
use kb_retrieval::domain::DomainError;
use kb_retrieval::infrastructure::storage::SqliteKnowledgeStore;
use kb_retrieval::{AppConfig, AppContext};

pub const DIMS: usize = 256;

/// Bag-of-words embedder: every term increments a hashed bucket
#[derive(Debug, Default)]
pub struct HashingEmbedder {
    calls: AtomicUsize,
    fail: bool,
}

impl HashingEmbedder {
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIMS];
        for term in tokenize(text) {
            v[bucket(&term)] += 1.0;
        }
        v
    }
}

fn bucket(term: &str) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in term.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % DIMS as u64) as usize
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DomainError::embedding("hashing", "rate limited"));
        }

        let data = request
            .texts()
            .iter()
            .enumerate()
            .map(|(i, text)| Embedding::new(i, Self::vector(text)))
            .collect();
        Ok(EmbeddingResponse::new(request.model(), data))
    }

    fn provider_name(&self) -> &'static str {
        "hashing"
    }

    fn model(&self) -> &str {
        "bag-of-words"
    }

    fn dimensions(&self) -> usize {
        DIMS
    }
}

/// A context over a SQLite file in a temporary directory
pub struct Harness {
    pub context: AppContext,
    pub embedder: Arc<HashingEmbedder>,
    pub dir: TempDir,
}

impl Harness {
    pub async fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self::with_embedder(chunk_size, chunk_overlap, HashingEmbedder::default()).await
    }

    pub async fn with_embedder(
        chunk_size: usize,
        chunk_overlap: usize,
        embedder: HashingEmbedder,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteKnowledgeStore::open(dir.path().join("knowledge.db"), DIMS)
            .await
            .unwrap();

        let mut config = AppConfig::default();
        config.embedding.dimensions = DIMS;
        config.chunking.chunk_size = chunk_size;
        config.chunking.chunk_overlap = chunk_overlap;

        let embedder = Arc::new(embedder);
        let context =
            AppContext::with_components(&config, Arc::new(store), embedder.clone()).unwrap();

        Self {
            context,
            embedder,
            dir,
        }
    }

    pub fn store(&self) -> &Arc<dyn KnowledgeStore> {
        &self.context.store
    }

    pub async fn knowledge_base(&self, owner: &OwnerId, name: &str) -> KnowledgeBase {
        let kb = KnowledgeBase::new(owner.clone(), name).unwrap();
        self.store().create_knowledge_base(&kb).await.unwrap();
        kb
    }

    pub async fn ingest(
        &self,
        owner: &OwnerId,
        kb: &KnowledgeBase,
        filename: &str,
        text: &str,
    ) -> kb_retrieval::domain::ingestion::IngestionReport {
        self.context
            .pipeline
            .ingest(owner, IngestDocument::new(kb.id().clone(), filename, text))
            .await
            .unwrap()
    }
}

pub fn owner(name: &str) -> OwnerId {
    OwnerId::new(name).unwrap()
}

pub const PARIS: &str = "Paris is the capital of France. The Eiffel Tower is in Paris.";
