//! Copy knowledge bases between backends
//!
//! Ids, sequences, text and vectors are copied verbatim; term statistics are
//! re-derived from chunk text on the target. Re-running a transfer replaces
//! each document's chunk set, so it converges instead of duplicating.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::domain::knowledge_base::{KnowledgeBase, NewChunk, OwnerId};
use crate::domain::retrieval::term_frequencies;
use crate::domain::storage::KnowledgeStore;
use crate::domain::DomainError;

/// Totals of a finished transfer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    pub owners: usize,
    pub knowledge_bases: usize,
    pub documents: usize,
    pub chunks: usize,
}

/// Copies data from one knowledge store to another
#[derive(Debug, Clone)]
pub struct StoreTransfer {
    source: Arc<dyn KnowledgeStore>,
    target: Arc<dyn KnowledgeStore>,
}

impl StoreTransfer {
    /// Both stores must hold vectors of the same size
    pub fn new(
        source: Arc<dyn KnowledgeStore>,
        target: Arc<dyn KnowledgeStore>,
    ) -> Result<Self, DomainError> {
        if source.dimensions() != target.dimensions() {
            return Err(DomainError::configuration(format!(
                "cannot transfer {}-dimensional vectors into a {}-dimensional store",
                source.dimensions(),
                target.dimensions()
            )));
        }
        Ok(Self { source, target })
    }

    /// Transfer every owner's knowledge bases
    pub async fn transfer_all(&self) -> Result<TransferReport, DomainError> {
        let started = Instant::now();
        let mut report = TransferReport::default();

        for owner in self.source.list_owners().await? {
            self.copy_owner(&owner, &mut report).await?;
        }

        info!(
            source = self.source.backend_name(),
            target = self.target.backend_name(),
            owners = report.owners,
            knowledge_bases = report.knowledge_bases,
            documents = report.documents,
            chunks = report.chunks,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Transfer completed"
        );
        Ok(report)
    }

    /// Transfer the knowledge bases of one owner
    pub async fn transfer_owner(&self, owner: &OwnerId) -> Result<TransferReport, DomainError> {
        let mut report = TransferReport::default();
        self.copy_owner(owner, &mut report).await?;

        info!(
            owner = %owner,
            knowledge_bases = report.knowledge_bases,
            documents = report.documents,
            chunks = report.chunks,
            "Owner transfer completed"
        );
        Ok(report)
    }

    async fn copy_owner(
        &self,
        owner: &OwnerId,
        report: &mut TransferReport,
    ) -> Result<(), DomainError> {
        let knowledge_bases = self.source.list_knowledge_bases(owner).await?;
        if knowledge_bases.is_empty() {
            return Ok(());
        }

        report.owners += 1;
        // oldest first so the target lists them in the same order
        for kb in knowledge_bases.iter().rev() {
            self.copy_knowledge_base(kb, report).await?;
        }
        Ok(())
    }

    async fn copy_knowledge_base(
        &self,
        kb: &KnowledgeBase,
        report: &mut TransferReport,
    ) -> Result<(), DomainError> {
        match self.target.get_knowledge_base(kb.id()).await? {
            Some(existing) if !existing.is_owned_by(kb.owner()) => {
                return Err(DomainError::conflict(format!(
                    "Knowledge base '{}' exists in the target under another owner",
                    kb.id()
                )));
            }
            Some(_) => self.target.update_knowledge_base(kb).await?,
            None => self.target.create_knowledge_base(kb).await?,
        }
        report.knowledge_bases += 1;

        let documents = self.source.list_documents(kb.id()).await?;
        for document in documents.iter().rev() {
            let chunks = self
                .source
                .list_chunks(document.id())
                .await?
                .into_iter()
                .map(|chunk| {
                    let embedding = chunk.embedding.ok_or_else(|| {
                        DomainError::storage(format!("Chunk '{}' has no stored vector", chunk.id))
                    })?;
                    Ok(NewChunk {
                        terms: term_frequencies(&chunk.content),
                        id: chunk.id,
                        sequence: chunk.sequence,
                        content: chunk.content,
                        embedding,
                    })
                })
                .collect::<Result<Vec<_>, DomainError>>()?;

            let count = chunks.len();
            self.target.replace_document(document, chunks).await?;

            debug!(
                kb_id = %kb.id(),
                document_id = %document.id(),
                chunks = count,
                "Document transferred"
            );
            report.documents += 1;
            report.chunks += count;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge_base::{ChunkId, Document, DocumentId};
    use crate::infrastructure::storage::SqliteKnowledgeStore;

    async fn sqlite(dims: usize) -> Arc<dyn KnowledgeStore> {
        Arc::new(SqliteKnowledgeStore::open_in_memory(dims).await.unwrap())
    }

    async fn seed(store: &Arc<dyn KnowledgeStore>, owner: &str, kb_name: &str) -> KnowledgeBase {
        let kb = KnowledgeBase::new(OwnerId::new(owner).unwrap(), kb_name).unwrap();
        store.create_knowledge_base(&kb).await.unwrap();

        let document = Document::new(DocumentId::generate(), kb.id().clone(), "paris.txt")
            .with_text_length(40);
        let chunks = ["paris is in france", "the eiffel tower"]
            .iter()
            .enumerate()
            .map(|(i, text)| NewChunk {
                id: ChunkId::generate(),
                sequence: i,
                content: text.to_string(),
                embedding: vec![1.0, i as f32, 0.0],
                terms: term_frequencies(text),
            })
            .collect();
        store.replace_document(&document, chunks).await.unwrap();
        kb
    }

    #[tokio::test]
    async fn test_rejects_dimension_mismatch() {
        let result = StoreTransfer::new(sqlite(3).await, sqlite(4).await);
        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_transfer_all_copies_everything() {
        let source = sqlite(3).await;
        let target = sqlite(3).await;
        let kb = seed(&source, "alice", "Travel").await;
        seed(&source, "bob", "Other").await;

        let report = StoreTransfer::new(source.clone(), target.clone())
            .unwrap()
            .transfer_all()
            .await
            .unwrap();

        assert_eq!(
            report,
            TransferReport {
                owners: 2,
                knowledge_bases: 2,
                documents: 2,
                chunks: 4
            }
        );

        let copied = target.get_knowledge_base(kb.id()).await.unwrap().unwrap();
        assert_eq!(copied.name(), "Travel");
        assert_eq!(target.count_chunks(kb.id()).await.unwrap(), 2);

        let source_docs = source.list_documents(kb.id()).await.unwrap();
        let source_chunks = source.list_chunks(source_docs[0].id()).await.unwrap();
        let target_chunks = target.list_chunks(source_docs[0].id()).await.unwrap();
        assert_eq!(source_chunks.len(), target_chunks.len());
        for (a, b) in source_chunks.iter().zip(&target_chunks) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.sequence, b.sequence);
            assert_eq!(a.content, b.content);
            let (va, vb) = (a.embedding.as_ref().unwrap(), b.embedding.as_ref().unwrap());
            assert!(va.iter().zip(vb).all(|(x, y)| (x - y).abs() < 1e-6));
        }

        let snapshot = target
            .lexical_snapshot(kb.id(), &["paris".to_string()])
            .await
            .unwrap();
        assert_eq!(snapshot.document_frequencies.get("paris"), Some(&1));
    }

    #[tokio::test]
    async fn test_transfer_is_repeatable() {
        let source = sqlite(3).await;
        let target = sqlite(3).await;
        let kb = seed(&source, "alice", "Travel").await;
        let transfer = StoreTransfer::new(source, target.clone()).unwrap();

        transfer.transfer_all().await.unwrap();
        transfer.transfer_all().await.unwrap();

        assert_eq!(target.count_chunks(kb.id()).await.unwrap(), 2);
        assert_eq!(target.list_documents(kb.id()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transfer_owner_only() {
        let source = sqlite(3).await;
        let target = sqlite(3).await;
        seed(&source, "alice", "Travel").await;
        let other = seed(&source, "bob", "Other").await;

        let report = StoreTransfer::new(source, target.clone())
            .unwrap()
            .transfer_owner(&OwnerId::new("alice").unwrap())
            .await
            .unwrap();

        assert_eq!(report.knowledge_bases, 1);
        assert!(target.get_knowledge_base(other.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_foreign_owner_in_target_conflicts() {
        let source = sqlite(3).await;
        let target = sqlite(3).await;
        let kb = seed(&source, "alice", "Travel").await;
        let squatter = KnowledgeBase::with_id(
            kb.id().clone(),
            OwnerId::new("mallory").unwrap(),
            "Travel",
        )
        .unwrap();
        target.create_knowledge_base(&squatter).await.unwrap();

        let result = StoreTransfer::new(source, target)
            .unwrap()
            .transfer_all()
            .await;

        assert!(matches!(result, Err(DomainError::Conflict { .. })));
    }
}
