//! Knowledge base entity and identifier types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validation::{
    validate_description, validate_id, validate_name, validate_owner_id,
    KnowledgeBaseValidationError,
};

/// Declares a validated string identifier newtype
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal, $validate:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier after validation
            pub fn new(id: impl Into<String>) -> Result<Self, KnowledgeBaseValidationError> {
                let id = id.into();
                ($validate)($kind, id.as_str())?;
                Ok(Self(id))
            }

            /// Get the inner string value
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = KnowledgeBaseValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

fn validate_owner(_kind: &'static str, id: &str) -> Result<(), KnowledgeBaseValidationError> {
    validate_owner_id(id)
}

string_id!(
    /// Knowledge base identifier
    KnowledgeBaseId,
    "Knowledge base",
    validate_id
);

string_id!(
    /// Document identifier
    DocumentId,
    "Document",
    validate_id
);

string_id!(
    /// Chunk identifier; ordering of these values breaks score ties
    ChunkId,
    "Chunk",
    validate_id
);

string_id!(
    /// Tenant / visitor that owns knowledge bases
    OwnerId,
    "Owner",
    validate_owner
);

impl KnowledgeBaseId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl DocumentId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl ChunkId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Knowledge base entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    /// Unique identifier
    id: KnowledgeBaseId,
    /// Owning tenant
    owner: OwnerId,
    /// Display name
    name: String,
    /// Description
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    /// Creation timestamp
    created_at: DateTime<Utc>,
    /// Last update timestamp
    updated_at: DateTime<Utc>,
}

impl KnowledgeBase {
    /// Create a new knowledge base with a generated id
    pub fn new(owner: OwnerId, name: impl Into<String>) -> Result<Self, KnowledgeBaseValidationError> {
        Self::with_id(KnowledgeBaseId::generate(), owner, name)
    }

    /// Create a new knowledge base with an explicit id
    pub fn with_id(
        id: KnowledgeBaseId,
        owner: OwnerId,
        name: impl Into<String>,
    ) -> Result<Self, KnowledgeBaseValidationError> {
        let name = name.into();
        validate_name(&name)?;
        let now = Utc::now();

        Ok(Self {
            id,
            owner,
            name: name.trim().to_string(),
            description: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuild an entity from persisted fields
    pub fn restore(
        id: KnowledgeBaseId,
        owner: OwnerId,
        name: String,
        description: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner,
            name,
            description,
            created_at,
            updated_at,
        }
    }

    /// Set description
    pub fn with_description(
        mut self,
        description: impl Into<String>,
    ) -> Result<Self, KnowledgeBaseValidationError> {
        let description = description.into();
        validate_description(&description)?;
        self.description = Some(description);
        Ok(self)
    }

    // Getters

    pub fn id(&self) -> &KnowledgeBaseId {
        &self.id
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether the given owner may read and modify this knowledge base
    pub fn is_owned_by(&self, owner: &OwnerId) -> bool {
        &self.owner == owner
    }

    // Mutators

    /// Update the name
    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), KnowledgeBaseValidationError> {
        let name = name.into();
        validate_name(&name)?;
        self.name = name.trim().to_string();
        self.touch();
        Ok(())
    }

    /// Update the description
    pub fn set_description(
        &mut self,
        description: Option<String>,
    ) -> Result<(), KnowledgeBaseValidationError> {
        if let Some(ref d) = description {
            validate_description(d)?;
        }
        self.description = description;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> OwnerId {
        OwnerId::new("visitor-1").unwrap()
    }

    #[test]
    fn test_generated_ids_are_valid_and_distinct() {
        let a = KnowledgeBaseId::generate();
        let b = KnowledgeBaseId::generate();

        assert_ne!(a, b);
        assert!(KnowledgeBaseId::new(a.as_str()).is_ok());
        assert!(ChunkId::new(ChunkId::generate().as_str()).is_ok());
    }

    #[test]
    fn test_id_serde_roundtrip_validates() {
        let json = serde_json::to_string(&DocumentId::new("doc-1").unwrap()).unwrap();
        assert_eq!(json, "\"doc-1\"");

        let invalid: Result<DocumentId, _> = serde_json::from_str("\"bad id\"");
        assert!(invalid.is_err());
    }

    #[test]
    fn test_chunk_ids_order_lexicographically() {
        let a = ChunkId::new("a-1").unwrap();
        let b = ChunkId::new("b-1").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_knowledge_base_creation() {
        let kb = KnowledgeBase::new(owner(), "  Research notes ")
            .unwrap()
            .with_description("papers")
            .unwrap();

        assert_eq!(kb.name(), "Research notes");
        assert_eq!(kb.description(), Some("papers"));
        assert!(kb.is_owned_by(&owner()));
        assert!(!kb.is_owned_by(&OwnerId::new("visitor-2").unwrap()));
    }

    #[test]
    fn test_knowledge_base_rejects_blank_name() {
        assert!(KnowledgeBase::new(owner(), " ").is_err());
    }

    #[test]
    fn test_rename_touches_updated_at() {
        let mut kb = KnowledgeBase::new(owner(), "Old").unwrap();
        let before = kb.updated_at();

        kb.set_name("New").unwrap();

        assert_eq!(kb.name(), "New");
        assert!(kb.updated_at() >= before);
        assert!(kb.set_name("").is_err());
        assert_eq!(kb.name(), "New");
    }
}
