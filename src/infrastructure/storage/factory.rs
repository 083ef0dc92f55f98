//! Storage factory for runtime backend selection

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use super::migrations::{
    postgres_migrations, sqlite_migrations, Migrator, PostgresMigrator, SqliteMigrator,
};
use super::postgres::{PostgresConfig, PostgresKnowledgeStore};
use super::sqlite::SqliteKnowledgeStore;
use crate::config::StorageSettings;
use crate::domain::storage::KnowledgeStore;
use crate::domain::DomainError;

/// Supported storage backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Single-file embedded store
    #[default]
    Sqlite,
    /// PostgreSQL with pgvector
    #[serde(alias = "postgresql")]
    Postgres,
}

impl StorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }
}

impl std::str::FromStr for StorageType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" | "embedded" => Ok(Self::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            other => Err(DomainError::configuration(format!(
                "Unknown storage backend: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage configuration
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Sqlite { path: PathBuf },
    Postgres(PostgresConfig),
}

impl StorageConfig {
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self::Sqlite { path: path.into() }
    }

    pub fn postgres(config: PostgresConfig) -> Self {
        Self::Postgres(config)
    }

    /// Creates a PostgreSQL configuration from a URL
    pub fn postgres_url(url: impl Into<String>) -> Self {
        Self::Postgres(PostgresConfig::new(url))
    }

    /// Resolve the configured backend; PostgreSQL requires a URL
    pub fn from_settings(settings: &StorageSettings) -> Result<Self, DomainError> {
        match settings.resolved_backend() {
            StorageType::Sqlite => Ok(Self::sqlite(&settings.sqlite_path)),
            StorageType::Postgres => {
                let url = settings.postgres_url.clone().ok_or_else(|| {
                    DomainError::configuration(
                        "storage.postgres_url is required for the postgres backend",
                    )
                })?;
                Ok(Self::Postgres(
                    PostgresConfig::new(url)
                        .with_max_connections(settings.max_connections)
                        .with_min_connections(settings.min_connections)
                        .with_connect_timeout(settings.connect_timeout_secs)
                        .with_idle_timeout(settings.idle_timeout_secs),
                ))
            }
        }
    }

    pub fn storage_type(&self) -> StorageType {
        match self {
            Self::Sqlite { .. } => StorageType::Sqlite,
            Self::Postgres(_) => StorageType::Postgres,
        }
    }
}

/// Factory for creating knowledge stores
#[derive(Debug)]
pub struct StorageFactory;

impl StorageFactory {
    /// Open a migrated store for the given embedding size
    pub async fn create(
        config: &StorageConfig,
        dimensions: usize,
    ) -> Result<Arc<dyn KnowledgeStore>, DomainError> {
        let store: Arc<dyn KnowledgeStore> = match config {
            StorageConfig::Sqlite { path } => {
                Arc::new(SqliteKnowledgeStore::open(path, dimensions).await?)
            }
            StorageConfig::Postgres(pg) => {
                Arc::new(PostgresKnowledgeStore::connect(pg, dimensions).await?)
            }
        };

        info!(
            backend = store.backend_name(),
            dimensions, "Knowledge store ready"
        );
        Ok(store)
    }

    pub async fn from_settings(
        settings: &StorageSettings,
        dimensions: usize,
    ) -> Result<Arc<dyn KnowledgeStore>, DomainError> {
        Self::create(&StorageConfig::from_settings(settings)?, dimensions).await
    }

    /// Migrator for the configured backend, without opening a store
    pub async fn migrator(
        config: &StorageConfig,
        dimensions: usize,
    ) -> Result<Box<dyn Migrator>, DomainError> {
        match config {
            StorageConfig::Sqlite { path } => {
                let conn = Connection::open(path).map_err(|e| {
                    DomainError::storage(format!(
                        "Failed to open database {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                conn.pragma_update(None, "foreign_keys", true)
                    .map_err(|e| DomainError::storage(format!("Failed to enable foreign keys: {}", e)))?;
                Ok(Box::new(SqliteMigrator::new(
                    Arc::new(Mutex::new(conn)),
                    sqlite_migrations(dimensions),
                )))
            }
            StorageConfig::Postgres(pg) => {
                let pool = PgPoolOptions::new()
                    .max_connections(1)
                    .connect(&pg.url)
                    .await
                    .map_err(|e| {
                        DomainError::storage(format!("Failed to connect to PostgreSQL: {}", e))
                    })?;
                Ok(Box::new(PostgresMigrator::new(
                    pool,
                    postgres_migrations(dimensions),
                )))
            }
        }
    }
}
