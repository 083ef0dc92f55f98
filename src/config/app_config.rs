use config::builder::DefaultState;
use config::ConfigBuilder;
use serde::Deserialize;

use crate::domain::ingestion::{ChunkingConfig, IngestionConfig};
use crate::domain::retrieval::{validate_vector_weight, Bm25Params, FusionConfig};
use crate::domain::DomainError;
use crate::infrastructure::embedding::{EmbeddingProviderType, RetryConfig};
use crate::infrastructure::retrieval::RetrieverConfig;
use crate::infrastructure::storage::StorageType;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub storage: StorageSettings,
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkingSettings,
    pub retrieval: RetrievalSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Explicit backend; inferred from `postgres_url` when absent
    pub backend: Option<StorageType>,
    pub sqlite_path: String,
    pub postgres_url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl StorageSettings {
    pub fn resolved_backend(&self) -> StorageType {
        match (self.backend, &self.postgres_url) {
            (Some(backend), _) => backend,
            (None, Some(url)) if url.starts_with("postgres") => StorageType::Postgres,
            _ => StorageType::Sqlite,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProviderType,
    /// Provider default when absent
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub dimensions: usize,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub batch_size: usize,
}

impl EmbeddingSettings {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_attempts)
            .with_initial_delay(self.initial_backoff_ms)
            .with_max_delay(self.max_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_document_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub vector_weight: f32,
    pub rrf_constant: f32,
    pub candidate_multiplier: usize,
    pub min_candidates: usize,
    pub bm25_k1: f32,
    pub bm25_b: f32,
    /// Serve results from one index when the other fails
    pub degrade_to_single_index: bool,
}

impl RetrievalSettings {
    pub fn retriever_config(&self) -> RetrieverConfig {
        RetrieverConfig {
            fusion: FusionConfig {
                rrf_constant: self.rrf_constant,
                candidate_multiplier: self.candidate_multiplier,
                min_candidates: self.min_candidates,
            },
            bm25: Bm25Params::new(self.bm25_k1, self.bm25_b),
            degrade_to_single_index: self.degrade_to_single_index,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: None,
            sqlite_path: "knowledge.db".to_string(),
            postgres_url: None,
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            idle_timeout_secs: 600,
        }
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::DashScope,
            base_url: None,
            api_key: None,
            model: "text-embedding-v2".to_string(),
            dimensions: 1536,
            timeout_secs: 30,
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5000,
            batch_size: 25,
        }
    }
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            max_document_chars: crate::domain::ingestion::DEFAULT_MAX_DOCUMENT_CHARS,
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            vector_weight: 0.5,
            rrf_constant: 60.0,
            candidate_multiplier: 4,
            min_candidates: 20,
            bm25_k1: 1.5,
            bm25_b: 0.75,
            degrade_to_single_index: false,
        }
    }
}

impl AppConfig {
    /// Load `config/default`, `config/local`, then `KBR__*` environment variables
    pub fn load() -> Result<Self, DomainError> {
        let _ = dotenvy::dotenv();

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("KBR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut config = Self::build(builder)?;

        if config.storage.postgres_url.is_none() {
            config.storage.postgres_url = std::env::var("DATABASE_URL").ok();
        }

        config.validate()?;
        Ok(config)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, DomainError> {
        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| DomainError::configuration(format!("Failed to load configuration: {}", e)))
    }

    /// Reject settings that would make ingestion or retrieval misbehave
    pub fn validate(&self) -> Result<(), DomainError> {
        self.ingestion_config().validate()?;

        if self.embedding.dimensions == 0 {
            return Err(DomainError::configuration(
                "embedding.dimensions must be greater than 0",
            ));
        }
        if self.embedding.max_attempts == 0 {
            return Err(DomainError::configuration(
                "embedding.max_attempts must be at least 1",
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(DomainError::configuration("retrieval.top_k must be at least 1"));
        }

        validate_vector_weight(self.retrieval.vector_weight)?;

        let retriever = self.retrieval.retriever_config();
        retriever.fusion.validate()?;
        retriever.bm25.validate()?;

        if self.storage.resolved_backend() == StorageType::Postgres
            && self.storage.postgres_url.is_none()
        {
            return Err(DomainError::configuration(
                "storage.postgres_url (or DATABASE_URL) is required for the postgres backend",
            ));
        }

        Ok(())
    }

    pub fn ingestion_config(&self) -> IngestionConfig {
        IngestionConfig::new(ChunkingConfig::new(
            self.chunking.chunk_size,
            self.chunking.chunk_overlap,
        ))
        .with_batch_size(self.embedding.batch_size)
        .with_max_document_chars(self.chunking.max_document_chars)
    }
}
