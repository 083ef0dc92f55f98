//! Versioned schema migrations for both storage backends
//!
//! Applied versions are recorded in a `_migrations` table, so running the
//! migrator again is a no-op.

mod postgres;
mod sqlite;

use async_trait::async_trait;

use crate::domain::DomainError;

pub use postgres::PostgresMigrator;
pub use sqlite::SqliteMigrator;

/// Trait for running database migrations
#[async_trait]
pub trait Migrator: Send + Sync {
    /// Runs all pending migrations
    async fn run(&self) -> Result<(), DomainError>;

    /// Reverts the last applied migration
    async fn revert(&self) -> Result<(), DomainError>;

    /// Returns the current migration version
    async fn version(&self) -> Result<Option<i64>, DomainError>;
}

/// Represents a database migration
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: String,
    /// SQL to run when applying the migration
    pub up: String,
    /// SQL to run when reverting the migration
    pub down: String,
}

impl Migration {
    pub fn new(
        version: i64,
        description: impl Into<String>,
        up: impl Into<String>,
        down: impl Into<String>,
    ) -> Self {
        Self {
            version,
            description: description.into(),
            up: up.into(),
            down: down.into(),
        }
    }
}

/// Key under which the embedding dimensionality is recorded
pub const DIMENSIONS_META_KEY: &str = "embedding_dimensions";

/// Schema of the networked backend
///
/// The vector column is sized at creation; the size is also recorded in
/// `store_meta` so a later start with a different size is refused.
pub fn postgres_migrations(dimensions: usize) -> Vec<Migration> {
    vec![
        Migration::new(
            1,
            "Create knowledge base tables",
            format!(
                r#"
                CREATE EXTENSION IF NOT EXISTS vector;

                CREATE TABLE IF NOT EXISTS store_meta (
                    key VARCHAR(64) PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS knowledge_bases (
                    id VARCHAR(64) PRIMARY KEY,
                    owner_id VARCHAR(128) NOT NULL,
                    name VARCHAR(100) NOT NULL,
                    description TEXT,
                    created_at TIMESTAMPTZ NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_knowledge_bases_owner
                    ON knowledge_bases(owner_id, created_at DESC);

                CREATE TABLE IF NOT EXISTS documents (
                    id VARCHAR(64) PRIMARY KEY,
                    knowledge_base_id VARCHAR(64) NOT NULL
                        REFERENCES knowledge_bases(id) ON DELETE CASCADE,
                    filename TEXT NOT NULL,
                    content_type TEXT,
                    text_length BIGINT NOT NULL,
                    chunk_count INTEGER NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_documents_kb
                    ON documents(knowledge_base_id, created_at DESC);

                CREATE TABLE IF NOT EXISTS document_chunks (
                    id VARCHAR(64) PRIMARY KEY,
                    document_id VARCHAR(64) NOT NULL
                        REFERENCES documents(id) ON DELETE CASCADE,
                    knowledge_base_id VARCHAR(64) NOT NULL
                        REFERENCES knowledge_bases(id) ON DELETE CASCADE,
                    sequence INTEGER NOT NULL,
                    content TEXT NOT NULL,
                    term_count INTEGER NOT NULL,
                    embedding vector({dimensions}) NOT NULL,
                    UNIQUE (document_id, sequence)
                );
                CREATE INDEX IF NOT EXISTS idx_document_chunks_kb
                    ON document_chunks(knowledge_base_id);

                CREATE TABLE IF NOT EXISTS chunk_terms (
                    chunk_id VARCHAR(64) NOT NULL
                        REFERENCES document_chunks(id) ON DELETE CASCADE,
                    knowledge_base_id VARCHAR(64) NOT NULL,
                    term TEXT NOT NULL,
                    frequency INTEGER NOT NULL,
                    PRIMARY KEY (chunk_id, term)
                );
                CREATE INDEX IF NOT EXISTS idx_chunk_terms_kb_term
                    ON chunk_terms(knowledge_base_id, term);

                INSERT INTO store_meta (key, value) VALUES ('{key}', '{dimensions}')
                    ON CONFLICT (key) DO NOTHING;
                "#,
                dimensions = dimensions,
                key = DIMENSIONS_META_KEY,
            ),
            r#"
            DROP TABLE IF EXISTS chunk_terms;
            DROP TABLE IF EXISTS document_chunks;
            DROP TABLE IF EXISTS documents;
            DROP TABLE IF EXISTS knowledge_bases;
            DROP TABLE IF EXISTS store_meta;
            "#,
        ),
    ]
}

/// Schema of the embedded backend
pub fn sqlite_migrations(dimensions: usize) -> Vec<Migration> {
    vec![
        Migration::new(
            1,
            "Create knowledge base tables",
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS store_meta (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS knowledge_bases (
                    id TEXT PRIMARY KEY,
                    owner_id TEXT NOT NULL,
                    name TEXT NOT NULL,
                    description TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_knowledge_bases_owner
                    ON knowledge_bases(owner_id, created_at);

                CREATE TABLE IF NOT EXISTS documents (
                    id TEXT PRIMARY KEY,
                    knowledge_base_id TEXT NOT NULL
                        REFERENCES knowledge_bases(id) ON DELETE CASCADE,
                    filename TEXT NOT NULL,
                    content_type TEXT,
                    text_length INTEGER NOT NULL,
                    chunk_count INTEGER NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_documents_kb
                    ON documents(knowledge_base_id, created_at);

                CREATE TABLE IF NOT EXISTS document_chunks (
                    id TEXT PRIMARY KEY,
                    document_id TEXT NOT NULL
                        REFERENCES documents(id) ON DELETE CASCADE,
                    knowledge_base_id TEXT NOT NULL
                        REFERENCES knowledge_bases(id) ON DELETE CASCADE,
                    sequence INTEGER NOT NULL,
                    content TEXT NOT NULL,
                    term_count INTEGER NOT NULL,
                    embedding BLOB NOT NULL,
                    UNIQUE (document_id, sequence)
                );
                CREATE INDEX IF NOT EXISTS idx_document_chunks_kb
                    ON document_chunks(knowledge_base_id);

                CREATE TABLE IF NOT EXISTS chunk_terms (
                    chunk_id TEXT NOT NULL
                        REFERENCES document_chunks(id) ON DELETE CASCADE,
                    knowledge_base_id TEXT NOT NULL,
                    term TEXT NOT NULL,
                    frequency INTEGER NOT NULL,
                    PRIMARY KEY (chunk_id, term)
                );
                CREATE INDEX IF NOT EXISTS idx_chunk_terms_kb_term
                    ON chunk_terms(knowledge_base_id, term);

                INSERT OR IGNORE INTO store_meta (key, value) VALUES ('{key}', '{dimensions}');
                "#,
                dimensions = dimensions,
                key = DIMENSIONS_META_KEY,
            ),
            r#"
            DROP TABLE IF EXISTS chunk_terms;
            DROP TABLE IF EXISTS document_chunks;
            DROP TABLE IF EXISTS documents;
            DROP TABLE IF EXISTS knowledge_bases;
            DROP TABLE IF EXISTS store_meta;
            "#,
        ),
    ]
}

/// Refuse to open a store created for another embedding size
pub(crate) fn check_recorded_dimensions(
    recorded: Option<String>,
    configured: usize,
) -> Result<(), DomainError> {
    match recorded {
        None => Ok(()),
        Some(value) => {
            let recorded: usize = value.trim().parse().map_err(|_| {
                DomainError::storage(format!("Invalid recorded embedding dimensions: {}", value))
            })?;
            if recorded != configured {
                return Err(DomainError::configuration(format!(
                    "store was created for {}-dimensional embeddings, configured {}",
                    recorded, configured
                )));
            }
            Ok(())
        }
    }
}
