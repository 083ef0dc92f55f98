//! Knowledge base validation utilities

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum length for identifiers (knowledge bases, documents, chunks)
pub const MAX_ID_LENGTH: usize = 64;

/// Maximum length for owner identifiers
pub const MAX_OWNER_LENGTH: usize = 128;

/// Maximum length for knowledge base names
pub const MAX_NAME_LENGTH: usize = 100;

/// Maximum length for knowledge base descriptions
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;

/// Regex pattern for valid identifiers (alphanumeric, hyphens, underscores)
static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]*$").unwrap());

/// Knowledge base validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum KnowledgeBaseValidationError {
    /// ID is empty
    EmptyId { kind: &'static str },
    /// ID exceeds maximum length
    IdTooLong {
        kind: &'static str,
        length: usize,
        max: usize,
    },
    /// ID contains invalid characters
    InvalidIdFormat { kind: &'static str, id: String },
    /// Name is blank
    EmptyName,
    /// Name exceeds maximum length
    NameTooLong { length: usize, max: usize },
    /// Description exceeds maximum length
    DescriptionTooLong { length: usize, max: usize },
}

impl fmt::Display for KnowledgeBaseValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyId { kind } => write!(f, "{} ID cannot be empty", kind),
            Self::IdTooLong { kind, length, max } => {
                write!(
                    f,
                    "{} ID too long: {} characters (max {})",
                    kind, length, max
                )
            }
            Self::InvalidIdFormat { kind, id } => {
                write!(
                    f,
                    "Invalid {} ID format '{}': must be alphanumeric with hyphens or underscores",
                    kind, id
                )
            }
            Self::EmptyName => write!(f, "Knowledge base name cannot be empty"),
            Self::NameTooLong { length, max } => {
                write!(
                    f,
                    "Knowledge base name too long: {} characters (max {})",
                    length, max
                )
            }
            Self::DescriptionTooLong { length, max } => {
                write!(
                    f,
                    "Knowledge base description too long: {} characters (max {})",
                    length, max
                )
            }
        }
    }
}

impl std::error::Error for KnowledgeBaseValidationError {}

/// Validate an identifier of the given kind
pub fn validate_id(kind: &'static str, id: &str) -> Result<(), KnowledgeBaseValidationError> {
    if id.is_empty() {
        return Err(KnowledgeBaseValidationError::EmptyId { kind });
    }

    if id.len() > MAX_ID_LENGTH {
        return Err(KnowledgeBaseValidationError::IdTooLong {
            kind,
            length: id.len(),
            max: MAX_ID_LENGTH,
        });
    }

    if !ID_PATTERN.is_match(id) {
        return Err(KnowledgeBaseValidationError::InvalidIdFormat {
            kind,
            id: id.to_string(),
        });
    }

    Ok(())
}

/// Validate an owner (tenant or visitor) identifier
///
/// Owners come from the surrounding service, so only emptiness, length and
/// control characters are checked.
pub fn validate_owner_id(owner: &str) -> Result<(), KnowledgeBaseValidationError> {
    if owner.trim().is_empty() {
        return Err(KnowledgeBaseValidationError::EmptyId { kind: "Owner" });
    }

    if owner.len() > MAX_OWNER_LENGTH {
        return Err(KnowledgeBaseValidationError::IdTooLong {
            kind: "Owner",
            length: owner.len(),
            max: MAX_OWNER_LENGTH,
        });
    }

    if owner.chars().any(char::is_control) {
        return Err(KnowledgeBaseValidationError::InvalidIdFormat {
            kind: "Owner",
            id: owner.to_string(),
        });
    }

    Ok(())
}

/// Validate a knowledge base display name
pub fn validate_name(name: &str) -> Result<(), KnowledgeBaseValidationError> {
    if name.trim().is_empty() {
        return Err(KnowledgeBaseValidationError::EmptyName);
    }

    let length = name.chars().count();

    if length > MAX_NAME_LENGTH {
        return Err(KnowledgeBaseValidationError::NameTooLong {
            length,
            max: MAX_NAME_LENGTH,
        });
    }

    Ok(())
}

/// Validate a knowledge base description
pub fn validate_description(description: &str) -> Result<(), KnowledgeBaseValidationError> {
    let length = description.chars().count();

    if length > MAX_DESCRIPTION_LENGTH {
        return Err(KnowledgeBaseValidationError::DescriptionTooLong {
            length,
            max: MAX_DESCRIPTION_LENGTH,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        assert!(validate_id("Knowledge base", "a").is_ok());
        assert!(validate_id("Knowledge base", "my-kb").is_ok());
        assert!(validate_id("Document", "doc_01").is_ok());
        assert!(validate_id("Chunk", "5f0c3a9e-8b1d-4c2e-9f7a-0d6b1e2c3f4a").is_ok());
    }

    #[test]
    fn test_invalid_ids() {
        assert!(matches!(
            validate_id("Knowledge base", ""),
            Err(KnowledgeBaseValidationError::EmptyId { .. })
        ));

        let long_id = "a".repeat(MAX_ID_LENGTH + 1);
        assert!(matches!(
            validate_id("Knowledge base", &long_id),
            Err(KnowledgeBaseValidationError::IdTooLong { .. })
        ));

        assert!(matches!(
            validate_id("Knowledge base", "-kb"),
            Err(KnowledgeBaseValidationError::InvalidIdFormat { .. })
        ));

        assert!(matches!(
            validate_id("Document", "doc'; DROP TABLE"),
            Err(KnowledgeBaseValidationError::InvalidIdFormat { .. })
        ));
    }

    #[test]
    fn test_owner_validation() {
        assert!(validate_owner_id("visitor_8f2a").is_ok());
        assert!(validate_owner_id("alice@example.com").is_ok());
        assert!(validate_owner_id("   ").is_err());
        assert!(validate_owner_id("bad\nowner").is_err());
    }

    #[test]
    fn test_name_validation() {
        assert!(validate_name("Product docs").is_ok());
        assert!(validate_name("产品文档").is_ok());
        assert!(validate_name("  ").is_err());
        assert!(validate_name(&"n".repeat(MAX_NAME_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_error_display_names_kind() {
        let err = validate_id("Document", "").unwrap_err();
        assert_eq!(err.to_string(), "Document ID cannot be empty");
    }
}
