use thiserror::Error;

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Chunking error: {message}")]
    Chunking { message: String },

    #[error("Embedding error: {provider} - {message}")]
    Embedding { provider: String, message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Storage error: embedding dimension mismatch (expected {expected}, got {actual})")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Authorization error: {message}")]
    Authorization { message: String },

    #[error("Ingestion of document '{document}' failed at {stage}: {source}")]
    Ingestion {
        document: String,
        stage: String,
        #[source]
        source: Box<DomainError>,
    },
}

impl DomainError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn chunking(message: impl Into<String>) -> Self {
        Self::Chunking {
            message: message.into(),
        }
    }

    pub fn embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Embedding {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    /// Wrap a mid-pipeline failure with the document and stage it hit
    pub fn ingestion(
        document: impl Into<String>,
        stage: impl std::fmt::Display,
        source: DomainError,
    ) -> Self {
        Self::Ingestion {
            document: document.into(),
            stage: stage.to_string(),
            source: Box::new(source),
        }
    }

    /// The underlying failure of a wrapped ingestion error
    pub fn root_cause(&self) -> &DomainError {
        match self {
            Self::Ingestion { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Only provider failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Embedding { .. })
    }

    /// Storage-class failures, including rejected vectors
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::DimensionMismatch { .. })
    }

    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Authorization { .. })
    }
}
