//! Knowledge Base service - owner-scoped management of knowledge bases and documents

use std::sync::Arc;

use tracing::info;

use crate::domain::knowledge_base::{
    Document, KnowledgeBase, KnowledgeBaseId, KnowledgeBaseValidationError, OwnerId,
};
use crate::domain::storage::KnowledgeStore;
use crate::domain::DomainError;

/// Request to create a new knowledge base
#[derive(Debug, Clone)]
pub struct CreateKnowledgeBaseRequest {
    /// Explicit id; generated when absent
    pub id: Option<String>,
    pub name: String,
    pub description: Option<String>,
}

impl CreateKnowledgeBaseRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Request to update an existing knowledge base
#[derive(Debug, Clone, Default)]
pub struct UpdateKnowledgeBaseRequest {
    pub name: Option<String>,
    /// `Some(None)` clears the description
    pub description: Option<Option<String>>,
}

/// Knowledge Base service for CRUD operations
pub struct KnowledgeBaseService {
    store: Arc<dyn KnowledgeStore>,
}

impl std::fmt::Debug for KnowledgeBaseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBaseService")
            .field("backend", &self.store.backend_name())
            .finish()
    }
}

impl KnowledgeBaseService {
    pub fn new(store: Arc<dyn KnowledgeStore>) -> Self {
        Self { store }
    }

    /// Get a knowledge base owned by `owner`
    ///
    /// Missing knowledge bases are `NotFound`; ones owned by someone else are
    /// an `Authorization` error.
    pub async fn get(&self, owner: &OwnerId, id: &str) -> Result<KnowledgeBase, DomainError> {
        let kb_id = self.parse_kb_id(id)?;

        let kb = self
            .store
            .get_knowledge_base(&kb_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Knowledge base '{}' not found", id)))?;

        if !kb.is_owned_by(owner) {
            return Err(DomainError::authorization(format!(
                "knowledge base '{}' is not accessible",
                id
            )));
        }

        Ok(kb)
    }

    /// Knowledge bases of `owner`, newest first
    pub async fn list(&self, owner: &OwnerId) -> Result<Vec<KnowledgeBase>, DomainError> {
        self.store.list_knowledge_bases(owner).await
    }

    pub async fn create(
        &self,
        owner: &OwnerId,
        request: CreateKnowledgeBaseRequest,
    ) -> Result<KnowledgeBase, DomainError> {
        let mut kb = match request.id {
            Some(id) => KnowledgeBase::with_id(self.parse_kb_id(&id)?, owner.clone(), request.name),
            None => KnowledgeBase::new(owner.clone(), request.name),
        }
        .map_err(|e| self.validation_error_to_domain(e))?;

        if let Some(description) = request.description {
            kb = kb
                .with_description(description)
                .map_err(|e| self.validation_error_to_domain(e))?;
        }

        self.store.create_knowledge_base(&kb).await?;
        info!(kb_id = %kb.id(), owner = %owner, name = %kb.name(), "Knowledge base created");

        Ok(kb)
    }

    /// Rename and/or change the description
    pub async fn update(
        &self,
        owner: &OwnerId,
        id: &str,
        request: UpdateKnowledgeBaseRequest,
    ) -> Result<KnowledgeBase, DomainError> {
        let mut kb = self.get(owner, id).await?;

        if let Some(name) = request.name {
            kb.set_name(name)
                .map_err(|e| self.validation_error_to_domain(e))?;
        }

        if let Some(description) = request.description {
            kb.set_description(description)
                .map_err(|e| self.validation_error_to_domain(e))?;
        }

        self.store.update_knowledge_base(&kb).await?;
        Ok(kb)
    }

    /// Delete a knowledge base with all of its documents and chunks
    pub async fn delete(&self, owner: &OwnerId, id: &str) -> Result<bool, DomainError> {
        let kb = self.get(owner, id).await?;

        let deleted = self.store.delete_knowledge_base(kb.id()).await?;
        if deleted {
            info!(kb_id = %kb.id(), owner = %owner, "Knowledge base deleted");
        }

        Ok(deleted)
    }

    /// Documents of an owned knowledge base, newest first
    pub async fn list_documents(
        &self,
        owner: &OwnerId,
        knowledge_base_id: &str,
    ) -> Result<Vec<Document>, DomainError> {
        let kb = self.get(owner, knowledge_base_id).await?;
        self.store.list_documents(kb.id()).await
    }

    /// Total chunks held by an owned knowledge base
    pub async fn chunk_count(
        &self,
        owner: &OwnerId,
        knowledge_base_id: &str,
    ) -> Result<usize, DomainError> {
        let kb = self.get(owner, knowledge_base_id).await?;
        self.store.count_chunks(kb.id()).await
    }

    fn parse_kb_id(&self, id: &str) -> Result<KnowledgeBaseId, DomainError> {
        KnowledgeBaseId::new(id).map_err(|e| self.validation_error_to_domain(e))
    }

    fn validation_error_to_domain(&self, error: KnowledgeBaseValidationError) -> DomainError {
        DomainError::validation(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::SqliteKnowledgeStore;

    async fn create_service() -> KnowledgeBaseService {
        let store = SqliteKnowledgeStore::open_in_memory(4).await.unwrap();
        KnowledgeBaseService::new(Arc::new(store))
    }

    fn alice() -> OwnerId {
        OwnerId::new("alice").unwrap()
    }

    fn bob() -> OwnerId {
        OwnerId::new("bob").unwrap()
    }

    #[tokio::test]
    async fn test_create_knowledge_base() {
        let service = create_service().await;
        let request = CreateKnowledgeBaseRequest::new("Travel").with_description("Trips");

        let kb = service.create(&alice(), request).await.unwrap();

        assert_eq!(kb.name(), "Travel");
        assert_eq!(kb.description(), Some("Trips"));
        assert!(kb.is_owned_by(&alice()));
    }

    #[tokio::test]
    async fn test_create_with_explicit_id() {
        let service = create_service().await;
        let request = CreateKnowledgeBaseRequest {
            id: Some("travel-kb".to_string()),
            ..CreateKnowledgeBaseRequest::new("Travel")
        };

        let kb = service.create(&alice(), request.clone()).await.unwrap();
        assert_eq!(kb.id().as_str(), "travel-kb");

        let duplicate = service.create(&alice(), request).await;
        assert!(matches!(duplicate, Err(DomainError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_create_rejects_blank_name() {
        let service = create_service().await;

        let result = service
            .create(&alice(), CreateKnowledgeBaseRequest::new("   "))
            .await;

        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_get_checks_owner() {
        let service = create_service().await;
        let kb = service
            .create(&alice(), CreateKnowledgeBaseRequest::new("Private"))
            .await
            .unwrap();

        assert!(service.get(&alice(), kb.id().as_str()).await.is_ok());
        assert!(service
            .get(&bob(), kb.id().as_str())
            .await
            .unwrap_err()
            .is_authorization());
        assert!(matches!(
            service.get(&alice(), "missing").await,
            Err(DomainError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_knowledge_base() {
        let service = create_service().await;
        let kb = service
            .create(
                &alice(),
                CreateKnowledgeBaseRequest::new("Old").with_description("to be cleared"),
            )
            .await
            .unwrap();

        let update = UpdateKnowledgeBaseRequest {
            name: Some("New".to_string()),
            description: Some(None),
        };
        let updated = service.update(&alice(), kb.id().as_str(), update).await.unwrap();

        assert_eq!(updated.name(), "New");
        assert_eq!(updated.description(), None);
        assert!(updated.updated_at() >= kb.updated_at());

        let reloaded = service.get(&alice(), kb.id().as_str()).await.unwrap();
        assert_eq!(reloaded.name(), "New");
    }

    #[tokio::test]
    async fn test_update_by_other_owner_denied() {
        let service = create_service().await;
        let kb = service
            .create(&alice(), CreateKnowledgeBaseRequest::new("Mine"))
            .await
            .unwrap();

        let update = UpdateKnowledgeBaseRequest {
            name: Some("Stolen".to_string()),
            ..Default::default()
        };
        let err = service
            .update(&bob(), kb.id().as_str(), update)
            .await
            .unwrap_err();

        assert!(err.is_authorization());
        let unchanged = service.get(&alice(), kb.id().as_str()).await.unwrap();
        assert_eq!(unchanged.name(), "Mine");
    }

    #[tokio::test]
    async fn test_delete_knowledge_base() {
        let service = create_service().await;
        let kb = service
            .create(&alice(), CreateKnowledgeBaseRequest::new("Temp"))
            .await
            .unwrap();

        assert!(service.delete(&bob(), kb.id().as_str()).await.is_err());
        assert!(service.delete(&alice(), kb.id().as_str()).await.unwrap());
        assert!(matches!(
            service.get(&alice(), kb.id().as_str()).await,
            Err(DomainError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_is_owner_scoped() {
        let service = create_service().await;
        service
            .create(&alice(), CreateKnowledgeBaseRequest::new("A1"))
            .await
            .unwrap();
        service
            .create(&alice(), CreateKnowledgeBaseRequest::new("A2"))
            .await
            .unwrap();
        service
            .create(&bob(), CreateKnowledgeBaseRequest::new("B1"))
            .await
            .unwrap();

        let names: Vec<String> = service
            .list(&alice())
            .await
            .unwrap()
            .iter()
            .map(|kb| kb.name().to_string())
            .collect();

        assert_eq!(names, vec!["A2", "A1"]);
    }

    #[tokio::test]
    async fn test_documents_of_empty_knowledge_base() {
        let service = create_service().await;
        let kb = service
            .create(&alice(), CreateKnowledgeBaseRequest::new("Empty"))
            .await
            .unwrap();

        assert!(service
            .list_documents(&alice(), kb.id().as_str())
            .await
            .unwrap()
            .is_empty());
        assert_eq!(service.chunk_count(&alice(), kb.id().as_str()).await.unwrap(), 0);
        assert!(service
            .list_documents(&bob(), kb.id().as_str())
            .await
            .unwrap_err()
            .is_authorization());
    }
}
