//! Knowledge base domain - tenants' document collections

mod document;
mod entity;
mod validation;

pub use document::{Document, NewChunk, StoredChunk};
pub use entity::{ChunkId, DocumentId, KnowledgeBase, KnowledgeBaseId, OwnerId};
pub use validation::{
    validate_description, validate_id, validate_name, validate_owner_id,
    KnowledgeBaseValidationError, MAX_DESCRIPTION_LENGTH, MAX_ID_LENGTH, MAX_NAME_LENGTH,
};

impl From<KnowledgeBaseValidationError> for crate::domain::DomainError {
    fn from(err: KnowledgeBaseValidationError) -> Self {
        crate::domain::DomainError::validation(err.to_string())
    }
}
