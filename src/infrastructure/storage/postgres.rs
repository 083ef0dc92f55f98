//! PostgreSQL knowledge store with pgvector similarity search

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::debug;

use super::migrations::{
    check_recorded_dimensions, postgres_migrations, Migrator, PostgresMigrator, DIMENSIONS_META_KEY,
};
use crate::domain::embedding::normalize;
use crate::domain::knowledge_base::{
    ChunkId, Document, DocumentId, KnowledgeBase, KnowledgeBaseId, NewChunk, OwnerId, StoredChunk,
};
use crate::domain::retrieval::bm25::sort_by_score;
use crate::domain::retrieval::{LexicalSnapshot, Posting};
use crate::domain::storage::{check_dimensions, validate_chunk_set, KnowledgeStore};
use crate::domain::DomainError;

/// PostgreSQL connection settings
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections to maintain
    pub min_connections: u32,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Idle timeout in seconds
    pub idle_timeout_secs: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/kb_retrieval".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            idle_timeout_secs: 600,
        }
    }
}

impl PostgresConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn with_idle_timeout(mut self, secs: u64) -> Self {
        self.idle_timeout_secs = secs;
        self
    }
}

/// Networked knowledge store on PostgreSQL with the pgvector extension
///
/// Similarity search is an exact cosine scan restricted to the requested
/// knowledge bases, so filtered queries never lose results to an
/// approximate index.
#[derive(Debug, Clone)]
pub struct PostgresKnowledgeStore {
    pool: PgPool,
    dimensions: usize,
}

impl PostgresKnowledgeStore {
    /// Connect, migrate and verify the recorded embedding size
    pub async fn connect(config: &PostgresConfig, dimensions: usize) -> Result<Self, DomainError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to connect to PostgreSQL: {}", e)))?;

        Self::from_pool(pool, dimensions).await
    }

    /// Use an existing pool; migrations run before the store is returned
    pub async fn from_pool(pool: PgPool, dimensions: usize) -> Result<Self, DomainError> {
        if dimensions == 0 {
            return Err(DomainError::configuration(
                "embedding dimensions must be greater than 0",
            ));
        }

        PostgresMigrator::new(pool.clone(), postgres_migrations(dimensions))
            .run()
            .await?;

        let recorded: Option<String> =
            sqlx::query_scalar("SELECT value FROM store_meta WHERE key = $1")
                .bind(DIMENSIONS_META_KEY)
                .fetch_optional(&pool)
                .await
                .map_err(pg_err("read store metadata"))?;
        check_recorded_dimensions(recorded, dimensions)?;

        debug!(dimensions, "Opened PostgreSQL knowledge store");
        Ok(Self { pool, dimensions })
    }

    /// Returns a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn pg_err(action: &'static str) -> impl Fn(sqlx::Error) -> DomainError {
    move |e| DomainError::storage(format!("Failed to {}: {}", action, e))
}

fn corrupt(e: impl std::fmt::Display) -> DomainError {
    DomainError::storage(format!("Corrupt row: {}", e))
}

/// pgvector text form, e.g. `[0.6,0.8,0]`
pub(crate) fn format_vector_literal(vector: &[f32]) -> String {
    let values: Vec<String> = vector.iter().map(|v| v.to_string()).collect();
    format!("[{}]", values.join(","))
}

pub(crate) fn parse_vector_literal(literal: &str) -> Result<Vec<f32>, DomainError> {
    let inner = literal
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| corrupt(format!("vector literal {}", literal)))?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|v| v.trim().parse::<f32>().map_err(corrupt))
        .collect()
}

fn ids_to_strings<T: AsRef<str>>(ids: impl IntoIterator<Item = T>) -> Vec<String> {
    ids.into_iter().map(|id| id.as_ref().to_string()).collect()
}

const KNOWLEDGE_BASE_COLUMNS: &str = "id, owner_id, name, description, created_at, updated_at";

fn row_to_knowledge_base(row: &PgRow) -> Result<KnowledgeBase, DomainError> {
    let id: String = row.try_get("id").map_err(corrupt)?;
    let owner: String = row.try_get("owner_id").map_err(corrupt)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(corrupt)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(corrupt)?;

    Ok(KnowledgeBase::restore(
        KnowledgeBaseId::new(id).map_err(corrupt)?,
        OwnerId::new(owner).map_err(corrupt)?,
        row.try_get("name").map_err(corrupt)?,
        row.try_get("description").map_err(corrupt)?,
        created_at,
        updated_at,
    ))
}

const DOCUMENT_COLUMNS: &str =
    "id, knowledge_base_id, filename, content_type, text_length, chunk_count, created_at";

fn row_to_document(row: &PgRow) -> Result<Document, DomainError> {
    let id: String = row.try_get("id").map_err(corrupt)?;
    let kb_id: String = row.try_get("knowledge_base_id").map_err(corrupt)?;
    let filename: String = row.try_get("filename").map_err(corrupt)?;
    let content_type: Option<String> = row.try_get("content_type").map_err(corrupt)?;
    let text_length: i64 = row.try_get("text_length").map_err(corrupt)?;
    let chunk_count: i32 = row.try_get("chunk_count").map_err(corrupt)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(corrupt)?;

    let mut document = Document::new(
        DocumentId::new(id).map_err(corrupt)?,
        KnowledgeBaseId::new(kb_id).map_err(corrupt)?,
        filename,
    )
    .with_text_length(text_length as usize)
    .with_chunk_count(chunk_count as usize)
    .with_created_at(created_at);

    if let Some(content_type) = content_type {
        document = document.with_content_type(content_type);
    }
    Ok(document)
}

fn row_to_chunk(row: &PgRow) -> Result<StoredChunk, DomainError> {
    let id: String = row.try_get("id").map_err(corrupt)?;
    let document_id: String = row.try_get("document_id").map_err(corrupt)?;
    let kb_id: String = row.try_get("knowledge_base_id").map_err(corrupt)?;
    let sequence: i32 = row.try_get("sequence").map_err(corrupt)?;
    let term_count: i32 = row.try_get("term_count").map_err(corrupt)?;
    let embedding: Option<String> = row.try_get("embedding").map_err(corrupt)?;

    Ok(StoredChunk {
        id: ChunkId::new(id).map_err(corrupt)?,
        document_id: DocumentId::new(document_id).map_err(corrupt)?,
        knowledge_base_id: KnowledgeBaseId::new(kb_id).map_err(corrupt)?,
        sequence: sequence as usize,
        content: row.try_get("content").map_err(corrupt)?,
        term_count: term_count as usize,
        embedding: embedding.as_deref().map(parse_vector_literal).transpose()?,
    })
}

#[async_trait]
impl KnowledgeStore for PostgresKnowledgeStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn create_knowledge_base(&self, knowledge_base: &KnowledgeBase) -> Result<(), DomainError> {
        let result = sqlx::query(
            "INSERT INTO knowledge_bases (id, owner_id, name, description, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(knowledge_base.id().as_str())
        .bind(knowledge_base.owner().as_str())
        .bind(knowledge_base.name())
        .bind(knowledge_base.description())
        .bind(knowledge_base.created_at())
        .bind(knowledge_base.updated_at())
        .execute(&self.pool)
        .await
        .map_err(pg_err("create knowledge base"))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::conflict(format!(
                "Knowledge base '{}' already exists",
                knowledge_base.id()
            )));
        }
        Ok(())
    }

    async fn get_knowledge_base(
        &self,
        id: &KnowledgeBaseId,
    ) -> Result<Option<KnowledgeBase>, DomainError> {
        sqlx::query(&format!(
            "SELECT {} FROM knowledge_bases WHERE id = $1",
            KNOWLEDGE_BASE_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(pg_err("get knowledge base"))?
        .as_ref()
        .map(row_to_knowledge_base)
        .transpose()
    }

    async fn get_knowledge_bases(
        &self,
        ids: &[KnowledgeBaseId],
    ) -> Result<Vec<KnowledgeBase>, DomainError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(&format!(
            "SELECT {} FROM knowledge_bases WHERE id = ANY($1) ORDER BY id",
            KNOWLEDGE_BASE_COLUMNS
        ))
        .bind(ids_to_strings(ids.iter().map(|id| id.as_str())))
        .fetch_all(&self.pool)
        .await
        .map_err(pg_err("get knowledge bases"))?;

        rows.iter().map(row_to_knowledge_base).collect()
    }

    async fn list_knowledge_bases(
        &self,
        owner: &OwnerId,
    ) -> Result<Vec<KnowledgeBase>, DomainError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM knowledge_bases WHERE owner_id = $1 ORDER BY created_at DESC, id DESC",
            KNOWLEDGE_BASE_COLUMNS
        ))
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(pg_err("list knowledge bases"))?;

        rows.iter().map(row_to_knowledge_base).collect()
    }

    async fn list_owners(&self) -> Result<Vec<OwnerId>, DomainError> {
        let owners: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT owner_id FROM knowledge_bases ORDER BY owner_id")
                .fetch_all(&self.pool)
                .await
                .map_err(pg_err("list owners"))?;

        owners
            .into_iter()
            .map(|o| OwnerId::new(o).map_err(corrupt))
            .collect()
    }

    async fn update_knowledge_base(&self, knowledge_base: &KnowledgeBase) -> Result<(), DomainError> {
        let result = sqlx::query(
            "UPDATE knowledge_bases SET name = $2, description = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(knowledge_base.id().as_str())
        .bind(knowledge_base.name())
        .bind(knowledge_base.description())
        .bind(knowledge_base.updated_at())
        .execute(&self.pool)
        .await
        .map_err(pg_err("update knowledge base"))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!(
                "Knowledge base '{}' not found",
                knowledge_base.id()
            )));
        }
        Ok(())
    }

    async fn delete_knowledge_base(&self, id: &KnowledgeBaseId) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM knowledge_bases WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(pg_err("delete knowledge base"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_document(&self, id: &DocumentId) -> Result<Option<Document>, DomainError> {
        sqlx::query(&format!(
            "SELECT {} FROM documents WHERE id = $1",
            DOCUMENT_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(pg_err("get document"))?
        .as_ref()
        .map(row_to_document)
        .transpose()
    }

    async fn get_documents(&self, ids: &[DocumentId]) -> Result<Vec<Document>, DomainError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE id = ANY($1)",
            DOCUMENT_COLUMNS
        ))
        .bind(ids_to_strings(ids.iter().map(|id| id.as_str())))
        .fetch_all(&self.pool)
        .await
        .map_err(pg_err("get documents"))?;

        rows.iter().map(row_to_document).collect()
    }

    async fn list_documents(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
    ) -> Result<Vec<Document>, DomainError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE knowledge_base_id = $1 ORDER BY created_at DESC, id DESC",
            DOCUMENT_COLUMNS
        ))
        .bind(knowledge_base_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(pg_err("list documents"))?;

        rows.iter().map(row_to_document).collect()
    }

    async fn delete_document(&self, id: &DocumentId) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(pg_err("delete document"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn replace_document(
        &self,
        document: &Document,
        chunks: Vec<NewChunk>,
    ) -> Result<usize, DomainError> {
        validate_chunk_set(&chunks, self.dimensions)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(pg_err("begin transaction"))?;

        let kb_exists: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM knowledge_bases WHERE id = $1 FOR SHARE")
                .bind(document.knowledge_base_id().as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(pg_err("check knowledge base"))?;
        if kb_exists.is_none() {
            return Err(DomainError::not_found(format!(
                "Knowledge base '{}' not found",
                document.knowledge_base_id()
            )));
        }

        let written: Option<String> = sqlx::query_scalar(
            "INSERT INTO documents (id, knowledge_base_id, filename, content_type, text_length, chunk_count, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (id) DO UPDATE SET
                filename = EXCLUDED.filename,
                content_type = EXCLUDED.content_type,
                text_length = EXCLUDED.text_length,
                chunk_count = EXCLUDED.chunk_count,
                created_at = EXCLUDED.created_at
             WHERE documents.knowledge_base_id = EXCLUDED.knowledge_base_id
             RETURNING id",
        )
        .bind(document.id().as_str())
        .bind(document.knowledge_base_id().as_str())
        .bind(document.filename())
        .bind(document.content_type())
        .bind(document.text_length() as i64)
        .bind(chunks.len() as i32)
        .bind(document.created_at())
        .fetch_optional(&mut *tx)
        .await
        .map_err(pg_err("write document"))?;

        if written.is_none() {
            return Err(DomainError::conflict(format!(
                "Document '{}' belongs to another knowledge base",
                document.id()
            )));
        }

        let replaced = sqlx::query("DELETE FROM document_chunks WHERE document_id = $1")
            .bind(document.id().as_str())
            .execute(&mut *tx)
            .await
            .map_err(pg_err("remove previous chunks"))?
            .rows_affected() as usize;

        if !chunks.is_empty() {
            let mut ids = Vec::with_capacity(chunks.len());
            let mut sequences = Vec::with_capacity(chunks.len());
            let mut contents = Vec::with_capacity(chunks.len());
            let mut term_counts = Vec::with_capacity(chunks.len());
            let mut embeddings = Vec::with_capacity(chunks.len());
            let mut term_chunk_ids = Vec::new();
            let mut terms = Vec::new();
            let mut frequencies = Vec::new();

            for chunk in chunks {
                ids.push(chunk.id.as_str().to_string());
                sequences.push(chunk.sequence as i32);
                term_counts.push(chunk.term_count() as i32);
                embeddings.push(format_vector_literal(&normalize(chunk.embedding)));
                for (term, frequency) in chunk.terms {
                    term_chunk_ids.push(chunk.id.as_str().to_string());
                    terms.push(term);
                    frequencies.push(frequency as i32);
                }
                contents.push(chunk.content);
            }

            sqlx::query(
                "INSERT INTO document_chunks (id, document_id, knowledge_base_id, sequence, content, term_count, embedding)
                 SELECT t.id, $2, $3, t.sequence, t.content, t.term_count, t.embedding::vector
                 FROM UNNEST($1::text[], $4::int4[], $5::text[], $6::int4[], $7::text[])
                    AS t(id, sequence, content, term_count, embedding)",
            )
            .bind(&ids)
            .bind(document.id().as_str())
            .bind(document.knowledge_base_id().as_str())
            .bind(&sequences)
            .bind(&contents)
            .bind(&term_counts)
            .bind(&embeddings)
            .execute(&mut *tx)
            .await
            .map_err(pg_err("insert chunks"))?;

            if !terms.is_empty() {
                sqlx::query(
                    "INSERT INTO chunk_terms (chunk_id, knowledge_base_id, term, frequency)
                     SELECT t.chunk_id, $2, t.term, t.frequency
                     FROM UNNEST($1::text[], $3::text[], $4::int4[]) AS t(chunk_id, term, frequency)",
                )
                .bind(&term_chunk_ids)
                .bind(document.knowledge_base_id().as_str())
                .bind(&terms)
                .bind(&frequencies)
                .execute(&mut *tx)
                .await
                .map_err(pg_err("insert chunk terms"))?;
            }
        }

        tx.commit().await.map_err(pg_err("commit document"))?;
        Ok(replaced)
    }

    async fn list_chunks(&self, document_id: &DocumentId) -> Result<Vec<StoredChunk>, DomainError> {
        let rows = sqlx::query(
            "SELECT id, document_id, knowledge_base_id, sequence, content, term_count,
                    embedding::text AS embedding
             FROM document_chunks WHERE document_id = $1 ORDER BY sequence",
        )
        .bind(document_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(pg_err("list chunks"))?;

        rows.iter().map(row_to_chunk).collect()
    }

    async fn get_chunks(&self, ids: &[ChunkId]) -> Result<Vec<StoredChunk>, DomainError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, document_id, knowledge_base_id, sequence, content, term_count,
                    NULL::text AS embedding
             FROM document_chunks WHERE id = ANY($1)",
        )
        .bind(ids_to_strings(ids.iter().map(|id| id.as_str())))
        .fetch_all(&self.pool)
        .await
        .map_err(pg_err("get chunks"))?;

        rows.iter().map(row_to_chunk).collect()
    }

    async fn count_chunks(&self, knowledge_base_id: &KnowledgeBaseId) -> Result<usize, DomainError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM document_chunks WHERE knowledge_base_id = $1")
                .bind(knowledge_base_id.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(pg_err("count chunks"))?;

        Ok(count as usize)
    }

    async fn delete_document_chunks(&self, document_id: &DocumentId) -> Result<usize, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(pg_err("begin transaction"))?;

        let deleted = sqlx::query("DELETE FROM document_chunks WHERE document_id = $1")
            .bind(document_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(pg_err("delete chunks"))?
            .rows_affected();

        sqlx::query("UPDATE documents SET chunk_count = 0 WHERE id = $1")
            .bind(document_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(pg_err("update document"))?;

        tx.commit().await.map_err(pg_err("commit chunk removal"))?;
        Ok(deleted as usize)
    }

    async fn upsert_vector(&self, chunk_id: &ChunkId, vector: Vec<f32>) -> Result<(), DomainError> {
        check_dimensions(self.dimensions, &vector)?;

        let result = sqlx::query("UPDATE document_chunks SET embedding = $2::vector WHERE id = $1")
            .bind(chunk_id.as_str())
            .bind(format_vector_literal(&normalize(vector)))
            .execute(&self.pool)
            .await
            .map_err(pg_err("write vector"))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!(
                "Chunk '{}' not found",
                chunk_id
            )));
        }
        Ok(())
    }

    async fn vector_search(
        &self,
        query: &[f32],
        limit: usize,
        knowledge_base_ids: &[KnowledgeBaseId],
    ) -> Result<Vec<(ChunkId, f32)>, DomainError> {
        check_dimensions(self.dimensions, query)?;
        if knowledge_base_ids.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, (1 - (embedding <=> $1::vector))::float8 AS similarity
             FROM document_chunks
             WHERE knowledge_base_id = ANY($2)
             ORDER BY embedding <=> $1::vector, id
             LIMIT $3",
        )
        .bind(format_vector_literal(&normalize(query.to_vec())))
        .bind(ids_to_strings(knowledge_base_ids.iter().map(|id| id.as_str())))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(pg_err("search vectors"))?;

        let mut scored = rows
            .iter()
            .map(|row| {
                let id: String = row.try_get("id").map_err(corrupt)?;
                let similarity: f64 = row.try_get("similarity").map_err(corrupt)?;
                Ok((ChunkId::new(id).map_err(corrupt)?, similarity as f32))
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        sort_by_score(&mut scored);
        Ok(scored)
    }

    async fn lexical_snapshot(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        terms: &[String],
    ) -> Result<LexicalSnapshot, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(pg_err("begin transaction"))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(pg_err("set snapshot isolation"))?;

        let (chunk_count, total_length): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(term_count), 0)::BIGINT
             FROM document_chunks WHERE knowledge_base_id = $1",
        )
        .bind(knowledge_base_id.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(pg_err("read corpus statistics"))?;

        let mut snapshot = LexicalSnapshot {
            chunk_count: chunk_count as usize,
            total_length: total_length as usize,
            ..Default::default()
        };

        if terms.is_empty() || chunk_count == 0 {
            tx.commit().await.map_err(pg_err("end snapshot"))?;
            return Ok(snapshot);
        }

        let frequencies: Vec<(String, i64)> = sqlx::query_as(
            "SELECT term, COUNT(*) FROM chunk_terms
             WHERE knowledge_base_id = $1 AND term = ANY($2)
             GROUP BY term",
        )
        .bind(knowledge_base_id.as_str())
        .bind(terms)
        .fetch_all(&mut *tx)
        .await
        .map_err(pg_err("read document frequencies"))?;

        snapshot.document_frequencies = frequencies
            .into_iter()
            .map(|(term, df)| (term, df as usize))
            .collect();

        let rows: Vec<(String, i32, String, i32)> = sqlx::query_as(
            "SELECT t.chunk_id, c.term_count, t.term, t.frequency
             FROM chunk_terms t JOIN document_chunks c ON c.id = t.chunk_id
             WHERE t.knowledge_base_id = $1 AND t.term = ANY($2)",
        )
        .bind(knowledge_base_id.as_str())
        .bind(terms)
        .fetch_all(&mut *tx)
        .await
        .map_err(pg_err("read postings"))?;

        tx.commit().await.map_err(pg_err("end snapshot"))?;

        let mut postings: HashMap<String, Posting> = HashMap::new();
        for (chunk_id, length, term, frequency) in rows {
            if !postings.contains_key(&chunk_id) {
                let posting = Posting {
                    chunk_id: ChunkId::new(chunk_id.clone()).map_err(corrupt)?,
                    length: length as usize,
                    term_frequencies: HashMap::new(),
                };
                postings.insert(chunk_id.clone(), posting);
            }
            if let Some(posting) = postings.get_mut(&chunk_id) {
                posting.term_frequencies.insert(term, frequency as u32);
            }
        }

        let mut postings: Vec<Posting> = postings.into_values().collect();
        postings.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
        snapshot.postings = postings;

        Ok(snapshot)
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("Closed PostgreSQL knowledge store");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::retrieval::term_frequencies;

    #[test]
    fn test_vector_literal_format() {
        assert_eq!(format_vector_literal(&[0.5, -1.0, 0.0]), "[0.5,-1,0]");
        assert_eq!(format_vector_literal(&[]), "[]");
    }

    #[test]
    fn test_vector_literal_parse() {
        assert_eq!(parse_vector_literal("[0.5,-1,0]").unwrap(), vec![0.5, -1.0, 0.0]);
        assert_eq!(parse_vector_literal(" [1, 2] ").unwrap(), vec![1.0, 2.0]);
        assert!(parse_vector_literal("[]").unwrap().is_empty());
        assert!(parse_vector_literal("1,2").is_err());
        assert!(parse_vector_literal("[a]").is_err());
    }

    #[test]
    fn test_vector_literal_preserves_values() {
        let v = vec![0.123_456_79f32, 1e-7, -3.25];
        assert_eq!(parse_vector_literal(&format_vector_literal(&v)).unwrap(), v);
    }

    #[test]
    fn test_config_builder() {
        let config = PostgresConfig::new("postgres://db/kb")
            .with_max_connections(4)
            .with_min_connections(2)
            .with_connect_timeout(5)
            .with_idle_timeout(60);

        assert_eq!(config.url, "postgres://db/kb");
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.connect_timeout_secs, 5);
        assert_eq!(config.idle_timeout_secs, 60);
    }

    /// Never connects: the vector checks run before any query is sent
    fn offline_store() -> PostgresKnowledgeStore {
        PostgresKnowledgeStore {
            pool: PgPoolOptions::new()
                .connect_lazy("postgres://localhost:1/unused")
                .unwrap(),
            dimensions: 3,
        }
    }

    #[tokio::test]
    async fn test_non_finite_and_zero_vectors_rejected_before_query() {
        let store = offline_store();
        let kb_id = KnowledgeBaseId::new("kb-1").unwrap();
        let document = Document::new(DocumentId::generate(), kb_id.clone(), "bad.txt");

        for bad in [vec![f32::NAN, 0.0, 0.0], vec![0.0, f32::NEG_INFINITY, 0.0], vec![0.0; 3]] {
            let chunk = NewChunk {
                id: ChunkId::generate(),
                sequence: 0,
                content: "bad".to_string(),
                embedding: bad.clone(),
                terms: term_frequencies("bad"),
            };
            let result = store.replace_document(&document, vec![chunk]).await;
            assert!(matches!(result, Err(DomainError::Storage { .. })));

            let result = store.upsert_vector(&ChunkId::generate(), bad.clone()).await;
            assert!(matches!(result, Err(DomainError::Storage { .. })));

            let result = store.vector_search(&bad, 5, std::slice::from_ref(&kb_id)).await;
            assert!(matches!(result, Err(DomainError::Storage { .. })));
        }
    }

    /// Requires a PostgreSQL with pgvector at `KBR_TEST_POSTGRES_URL`
    #[tokio::test]
    #[ignore]
    async fn test_live_replace_and_search() {
        let Ok(url) = std::env::var("KBR_TEST_POSTGRES_URL") else {
            return;
        };
        let store = PostgresKnowledgeStore::connect(&PostgresConfig::new(url), 3)
            .await
            .unwrap();

        let owner = OwnerId::new("live-test").unwrap();
        let kb = KnowledgeBase::new(owner, "live").unwrap();
        store.create_knowledge_base(&kb).await.unwrap();

        let document = Document::new(DocumentId::generate(), kb.id().clone(), "paris.txt");
        let chunk = NewChunk {
            id: ChunkId::generate(),
            sequence: 0,
            content: "paris france".to_string(),
            embedding: vec![1.0, 0.0, 0.0],
            terms: term_frequencies("paris france"),
        };
        store.replace_document(&document, vec![chunk]).await.unwrap();

        let hits = store
            .vector_search(&[1.0, 0.0, 0.0], 5, &[kb.id().clone()])
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].1 - 1.0).abs() < 1e-5);

        let snapshot = store
            .lexical_snapshot(kb.id(), &["paris".to_string()])
            .await
            .unwrap();
        assert_eq!(snapshot.document_frequencies.get("paris"), Some(&1));

        store.delete_knowledge_base(kb.id()).await.unwrap();
        store.close().await;
    }
}
