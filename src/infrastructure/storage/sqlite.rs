//! Embedded knowledge store on a single SQLite file
//!
//! Embeddings live next to their chunks as little-endian `f32` BLOBs and
//! similarity search is a brute-force dot product over unit vectors. All
//! access goes through one connection guarded by a mutex, which also
//! serializes concurrent writers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::debug;

use super::migrations::{check_recorded_dimensions, sqlite_migrations, Migrator, SqliteMigrator, DIMENSIONS_META_KEY};
use crate::domain::embedding::{dot, normalize};
use crate::domain::knowledge_base::{
    ChunkId, Document, DocumentId, KnowledgeBase, KnowledgeBaseId, NewChunk, OwnerId, StoredChunk,
};
use crate::domain::retrieval::bm25::sort_by_score;
use crate::domain::retrieval::{LexicalSnapshot, Posting};
use crate::domain::storage::{check_dimensions, validate_chunk_set, KnowledgeStore};
use crate::domain::DomainError;

/// Embedded SQLite knowledge store
#[derive(Debug, Clone)]
pub struct SqliteKnowledgeStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
    dimensions: usize,
}

impl SqliteKnowledgeStore {
    /// Open (or create) a store file and bring its schema up to date
    pub async fn open(path: impl AsRef<Path>, dimensions: usize) -> Result<Self, DomainError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DomainError::storage(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(&path).map_err(|e| {
            DomainError::storage(format!("Failed to open database {}: {}", path.display(), e))
        })?;

        Self::init(conn, Some(path), dimensions).await
    }

    /// Private in-memory store
    pub async fn open_in_memory(dimensions: usize) -> Result<Self, DomainError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DomainError::storage(format!("Failed to open database: {}", e)))?;

        Self::init(conn, None, dimensions).await
    }

    async fn init(
        conn: Connection,
        path: Option<PathBuf>,
        dimensions: usize,
    ) -> Result<Self, DomainError> {
        if dimensions == 0 {
            return Err(DomainError::configuration(
                "embedding dimensions must be greater than 0",
            ));
        }

        conn.pragma_update(None, "foreign_keys", true)
            .map_err(db_err("enable foreign keys"))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(db_err("set busy timeout"))?;
        if path.is_some() {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })
            .map_err(db_err("enable WAL"))?;
        }

        let conn = Arc::new(Mutex::new(conn));
        SqliteMigrator::new(conn.clone(), sqlite_migrations(dimensions))
            .run()
            .await?;

        let store = Self {
            conn,
            path,
            dimensions,
        };

        let recorded = store
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT value FROM store_meta WHERE key = ?1",
                    params![DIMENSIONS_META_KEY],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .map_err(db_err("read store metadata"))
            })
            .await?;
        check_recorded_dimensions(recorded, dimensions)?;

        debug!(path = ?store.path, dimensions, "Opened SQLite knowledge store");
        Ok(store)
    }

    /// Shared connection handle (for migrations and tooling)
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run blocking database work off the async executor
    async fn with_conn<T, F>(&self, f: F) -> Result<T, DomainError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, DomainError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| DomainError::storage("SQLite connection lock poisoned"))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| DomainError::storage(format!("SQLite task failed: {}", e)))?
    }
}

fn db_err(action: &'static str) -> impl Fn(rusqlite::Error) -> DomainError {
    move |e| DomainError::storage(format!("Failed to {}: {}", action, e))
}

fn corrupt(e: impl std::fmt::Display) -> DomainError {
    DomainError::storage(format!("Corrupt row: {}", e))
}

fn placeholders(n: usize, offset: usize) -> String {
    (1..=n)
        .map(|i| format!("?{}", i + offset))
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DomainError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(corrupt)
}

pub(crate) fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>, DomainError> {
    if bytes.len() % 4 != 0 {
        return Err(corrupt(format!("embedding blob of {} bytes", bytes.len())));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

type KnowledgeBaseRow = (String, String, String, Option<String>, String, String);

const KNOWLEDGE_BASE_COLUMNS: &str = "id, owner_id, name, description, created_at, updated_at";

fn read_knowledge_base(row: &rusqlite::Row<'_>) -> rusqlite::Result<KnowledgeBaseRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn to_knowledge_base(row: KnowledgeBaseRow) -> Result<KnowledgeBase, DomainError> {
    let (id, owner, name, description, created_at, updated_at) = row;
    Ok(KnowledgeBase::restore(
        KnowledgeBaseId::new(id).map_err(corrupt)?,
        OwnerId::new(owner).map_err(corrupt)?,
        name,
        description,
        parse_timestamp(&created_at)?,
        parse_timestamp(&updated_at)?,
    ))
}

type DocumentRow = (String, String, String, Option<String>, i64, i64, String);

const DOCUMENT_COLUMNS: &str =
    "id, knowledge_base_id, filename, content_type, text_length, chunk_count, created_at";

fn read_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn to_document(row: DocumentRow) -> Result<Document, DomainError> {
    let (id, kb_id, filename, content_type, text_length, chunk_count, created_at) = row;
    let mut document = Document::new(
        DocumentId::new(id).map_err(corrupt)?,
        KnowledgeBaseId::new(kb_id).map_err(corrupt)?,
        filename,
    )
    .with_text_length(text_length as usize)
    .with_chunk_count(chunk_count as usize)
    .with_created_at(parse_timestamp(&created_at)?);

    if let Some(content_type) = content_type {
        document = document.with_content_type(content_type);
    }
    Ok(document)
}

type ChunkRow = (String, String, String, i64, String, i64, Option<Vec<u8>>);

fn read_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChunkRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn to_chunk(row: ChunkRow) -> Result<StoredChunk, DomainError> {
    let (id, document_id, kb_id, sequence, content, term_count, embedding) = row;
    Ok(StoredChunk {
        id: ChunkId::new(id).map_err(corrupt)?,
        document_id: DocumentId::new(document_id).map_err(corrupt)?,
        knowledge_base_id: KnowledgeBaseId::new(kb_id).map_err(corrupt)?,
        sequence: sequence as usize,
        content,
        term_count: term_count as usize,
        embedding: embedding.as_deref().map(decode_embedding).transpose()?,
    })
}

#[async_trait]
impl KnowledgeStore for SqliteKnowledgeStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn create_knowledge_base(&self, knowledge_base: &KnowledgeBase) -> Result<(), DomainError> {
        let kb = knowledge_base.clone();

        self.with_conn(move |conn| {
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO knowledge_bases (id, owner_id, name, description, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        kb.id().as_str(),
                        kb.owner().as_str(),
                        kb.name(),
                        kb.description(),
                        format_timestamp(kb.created_at()),
                        format_timestamp(kb.updated_at()),
                    ],
                )
                .map_err(db_err("create knowledge base"))?;

            if inserted == 0 {
                return Err(DomainError::conflict(format!(
                    "Knowledge base '{}' already exists",
                    kb.id()
                )));
            }
            Ok(())
        })
        .await
    }

    async fn get_knowledge_base(
        &self,
        id: &KnowledgeBaseId,
    ) -> Result<Option<KnowledgeBase>, DomainError> {
        let id = id.clone();

        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM knowledge_bases WHERE id = ?1", KNOWLEDGE_BASE_COLUMNS),
                params![id.as_str()],
                read_knowledge_base,
            )
            .optional()
            .map_err(db_err("get knowledge base"))?
            .map(to_knowledge_base)
            .transpose()
        })
        .await
    }

    async fn get_knowledge_bases(
        &self,
        ids: &[KnowledgeBaseId],
    ) -> Result<Vec<KnowledgeBase>, DomainError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();

        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM knowledge_bases WHERE id IN ({}) ORDER BY id",
                KNOWLEDGE_BASE_COLUMNS,
                placeholders(ids.len(), 0)
            );
            let mut stmt = conn.prepare(&sql).map_err(db_err("get knowledge bases"))?;
            let rows = stmt
                .query_map(params_from_iter(ids.iter()), read_knowledge_base)
                .map_err(db_err("get knowledge bases"))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err("get knowledge bases"))?;
            rows.into_iter().map(to_knowledge_base).collect()
        })
        .await
    }

    async fn list_knowledge_bases(
        &self,
        owner: &OwnerId,
    ) -> Result<Vec<KnowledgeBase>, DomainError> {
        let owner = owner.clone();

        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM knowledge_bases WHERE owner_id = ?1 ORDER BY created_at DESC, rowid DESC",
                KNOWLEDGE_BASE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql).map_err(db_err("list knowledge bases"))?;
            let rows = stmt
                .query_map(params![owner.as_str()], read_knowledge_base)
                .map_err(db_err("list knowledge bases"))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err("list knowledge bases"))?;
            rows.into_iter().map(to_knowledge_base).collect()
        })
        .await
    }

    async fn list_owners(&self) -> Result<Vec<OwnerId>, DomainError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT DISTINCT owner_id FROM knowledge_bases ORDER BY owner_id")
                .map_err(db_err("list owners"))?;
            let owners = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(db_err("list owners"))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err("list owners"))?;
            owners
                .into_iter()
                .map(|o| OwnerId::new(o).map_err(corrupt))
                .collect()
        })
        .await
    }

    async fn update_knowledge_base(&self, knowledge_base: &KnowledgeBase) -> Result<(), DomainError> {
        let kb = knowledge_base.clone();

        self.with_conn(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE knowledge_bases SET name = ?2, description = ?3, updated_at = ?4 WHERE id = ?1",
                    params![
                        kb.id().as_str(),
                        kb.name(),
                        kb.description(),
                        format_timestamp(kb.updated_at()),
                    ],
                )
                .map_err(db_err("update knowledge base"))?;

            if updated == 0 {
                return Err(DomainError::not_found(format!(
                    "Knowledge base '{}' not found",
                    kb.id()
                )));
            }
            Ok(())
        })
        .await
    }

    async fn delete_knowledge_base(&self, id: &KnowledgeBaseId) -> Result<bool, DomainError> {
        let id = id.clone();

        self.with_conn(move |conn| {
            let deleted = conn
                .execute("DELETE FROM knowledge_bases WHERE id = ?1", params![id.as_str()])
                .map_err(db_err("delete knowledge base"))?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn get_document(&self, id: &DocumentId) -> Result<Option<Document>, DomainError> {
        let id = id.clone();

        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM documents WHERE id = ?1", DOCUMENT_COLUMNS),
                params![id.as_str()],
                read_document,
            )
            .optional()
            .map_err(db_err("get document"))?
            .map(to_document)
            .transpose()
        })
        .await
    }

    async fn get_documents(&self, ids: &[DocumentId]) -> Result<Vec<Document>, DomainError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();

        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM documents WHERE id IN ({})",
                DOCUMENT_COLUMNS,
                placeholders(ids.len(), 0)
            );
            let mut stmt = conn.prepare(&sql).map_err(db_err("get documents"))?;
            let rows = stmt
                .query_map(params_from_iter(ids.iter()), read_document)
                .map_err(db_err("get documents"))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err("get documents"))?;
            rows.into_iter().map(to_document).collect()
        })
        .await
    }

    async fn list_documents(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
    ) -> Result<Vec<Document>, DomainError> {
        let kb_id = knowledge_base_id.clone();

        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM documents WHERE knowledge_base_id = ?1 ORDER BY created_at DESC, rowid DESC",
                DOCUMENT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql).map_err(db_err("list documents"))?;
            let rows = stmt
                .query_map(params![kb_id.as_str()], read_document)
                .map_err(db_err("list documents"))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err("list documents"))?;
            rows.into_iter().map(to_document).collect()
        })
        .await
    }

    async fn delete_document(&self, id: &DocumentId) -> Result<bool, DomainError> {
        let id = id.clone();

        self.with_conn(move |conn| {
            let deleted = conn
                .execute("DELETE FROM documents WHERE id = ?1", params![id.as_str()])
                .map_err(db_err("delete document"))?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn replace_document(
        &self,
        document: &Document,
        chunks: Vec<NewChunk>,
    ) -> Result<usize, DomainError> {
        validate_chunk_set(&chunks, self.dimensions)?;
        let document = document.clone();

        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(db_err("begin transaction"))?;

            let kb_exists = tx
                .query_row(
                    "SELECT 1 FROM knowledge_bases WHERE id = ?1",
                    params![document.knowledge_base_id().as_str()],
                    |_| Ok(()),
                )
                .optional()
                .map_err(db_err("check knowledge base"))?
                .is_some();
            if !kb_exists {
                return Err(DomainError::not_found(format!(
                    "Knowledge base '{}' not found",
                    document.knowledge_base_id()
                )));
            }

            let existing_kb: Option<String> = tx
                .query_row(
                    "SELECT knowledge_base_id FROM documents WHERE id = ?1",
                    params![document.id().as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err("check document"))?;
            if let Some(existing_kb) = existing_kb {
                if existing_kb != document.knowledge_base_id().as_str() {
                    return Err(DomainError::conflict(format!(
                        "Document '{}' belongs to another knowledge base",
                        document.id()
                    )));
                }
            }

            let replaced = tx
                .execute(
                    "DELETE FROM document_chunks WHERE document_id = ?1",
                    params![document.id().as_str()],
                )
                .map_err(db_err("remove previous chunks"))?;

            tx.execute(
                "INSERT INTO documents (id, knowledge_base_id, filename, content_type, text_length, chunk_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (id) DO UPDATE SET
                    filename = excluded.filename,
                    content_type = excluded.content_type,
                    text_length = excluded.text_length,
                    chunk_count = excluded.chunk_count,
                    created_at = excluded.created_at",
                params![
                    document.id().as_str(),
                    document.knowledge_base_id().as_str(),
                    document.filename(),
                    document.content_type(),
                    document.text_length() as i64,
                    chunks.len() as i64,
                    format_timestamp(document.created_at()),
                ],
            )
            .map_err(db_err("write document"))?;

            {
                let mut insert_chunk = tx
                    .prepare(
                        "INSERT INTO document_chunks (id, document_id, knowledge_base_id, sequence, content, term_count, embedding)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    )
                    .map_err(db_err("prepare chunk insert"))?;
                let mut insert_term = tx
                    .prepare(
                        "INSERT INTO chunk_terms (chunk_id, knowledge_base_id, term, frequency)
                         VALUES (?1, ?2, ?3, ?4)",
                    )
                    .map_err(db_err("prepare term insert"))?;

                for chunk in &chunks {
                    let embedding = normalize(chunk.embedding.clone());
                    insert_chunk
                        .execute(params![
                            chunk.id.as_str(),
                            document.id().as_str(),
                            document.knowledge_base_id().as_str(),
                            chunk.sequence as i64,
                            chunk.content,
                            chunk.term_count() as i64,
                            encode_embedding(&embedding),
                        ])
                        .map_err(db_err("insert chunk"))?;

                    for (term, frequency) in &chunk.terms {
                        insert_term
                            .execute(params![
                                chunk.id.as_str(),
                                document.knowledge_base_id().as_str(),
                                term,
                                *frequency as i64,
                            ])
                            .map_err(db_err("insert chunk terms"))?;
                    }
                }
            }

            tx.commit().map_err(db_err("commit document"))?;
            Ok(replaced)
        })
        .await
    }

    async fn list_chunks(&self, document_id: &DocumentId) -> Result<Vec<StoredChunk>, DomainError> {
        let document_id = document_id.clone();

        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, document_id, knowledge_base_id, sequence, content, term_count, embedding
                     FROM document_chunks WHERE document_id = ?1 ORDER BY sequence",
                )
                .map_err(db_err("list chunks"))?;
            let rows = stmt
                .query_map(params![document_id.as_str()], read_chunk)
                .map_err(db_err("list chunks"))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err("list chunks"))?;
            rows.into_iter().map(to_chunk).collect()
        })
        .await
    }

    async fn get_chunks(&self, ids: &[ChunkId]) -> Result<Vec<StoredChunk>, DomainError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();

        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT id, document_id, knowledge_base_id, sequence, content, term_count, NULL
                 FROM document_chunks WHERE id IN ({})",
                placeholders(ids.len(), 0)
            );
            let mut stmt = conn.prepare(&sql).map_err(db_err("get chunks"))?;
            let rows = stmt
                .query_map(params_from_iter(ids.iter()), read_chunk)
                .map_err(db_err("get chunks"))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err("get chunks"))?;
            rows.into_iter().map(to_chunk).collect()
        })
        .await
    }

    async fn count_chunks(&self, knowledge_base_id: &KnowledgeBaseId) -> Result<usize, DomainError> {
        let kb_id = knowledge_base_id.clone();

        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM document_chunks WHERE knowledge_base_id = ?1",
                params![kb_id.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as usize)
            .map_err(db_err("count chunks"))
        })
        .await
    }

    async fn delete_document_chunks(&self, document_id: &DocumentId) -> Result<usize, DomainError> {
        let document_id = document_id.clone();

        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(db_err("begin transaction"))?;
            let deleted = tx
                .execute(
                    "DELETE FROM document_chunks WHERE document_id = ?1",
                    params![document_id.as_str()],
                )
                .map_err(db_err("delete chunks"))?;
            tx.execute(
                "UPDATE documents SET chunk_count = 0 WHERE id = ?1",
                params![document_id.as_str()],
            )
            .map_err(db_err("update document"))?;
            tx.commit().map_err(db_err("commit chunk removal"))?;
            Ok(deleted)
        })
        .await
    }

    async fn upsert_vector(&self, chunk_id: &ChunkId, vector: Vec<f32>) -> Result<(), DomainError> {
        check_dimensions(self.dimensions, &vector)?;
        let chunk_id = chunk_id.clone();
        let blob = encode_embedding(&normalize(vector));

        self.with_conn(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE document_chunks SET embedding = ?2 WHERE id = ?1",
                    params![chunk_id.as_str(), blob],
                )
                .map_err(db_err("write vector"))?;
            if updated == 0 {
                return Err(DomainError::not_found(format!(
                    "Chunk '{}' not found",
                    chunk_id
                )));
            }
            Ok(())
        })
        .await
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

        let query = normalize(query.to_vec());
        let ids: Vec<String> = knowledge_base_ids
            .iter()
            .map(|id| id.as_str().to_string())
            .collect();

        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT id, embedding FROM document_chunks WHERE knowledge_base_id IN ({})",
                placeholders(ids.len(), 0)
            );
            let mut stmt = conn.prepare(&sql).map_err(db_err("search vectors"))?;
            let mut rows = stmt
                .query(params_from_iter(ids.iter()))
                .map_err(db_err("search vectors"))?;

            let mut scored = Vec::new();
            while let Some(row) = rows.next().map_err(db_err("search vectors"))? {
                let id: String = row.get(0).map_err(db_err("search vectors"))?;
                let blob: Vec<u8> = row.get(1).map_err(db_err("search vectors"))?;
                let embedding = decode_embedding(&blob)?;
                scored.push((ChunkId::new(id).map_err(corrupt)?, dot(&query, &embedding)));
            }

            sort_by_score(&mut scored);
            scored.truncate(limit);
            Ok(scored)
        })
        .await
    }

    async fn lexical_snapshot(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        terms: &[String],
    ) -> Result<LexicalSnapshot, DomainError> {
        let kb_id = knowledge_base_id.as_str().to_string();
        let terms = terms.to_vec();

        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(db_err("begin transaction"))?;

            let (chunk_count, total_length): (i64, i64) = tx
                .query_row(
                    "SELECT COUNT(*), COALESCE(SUM(term_count), 0)
                     FROM document_chunks WHERE knowledge_base_id = ?1",
                    params![kb_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .map_err(db_err("read corpus statistics"))?;

            let mut snapshot = LexicalSnapshot {
                chunk_count: chunk_count as usize,
                total_length: total_length as usize,
                ..Default::default()
            };

            if terms.is_empty() || chunk_count == 0 {
                return Ok(snapshot);
            }

            let mut bind: Vec<&str> = vec![kb_id.as_str()];
            bind.extend(terms.iter().map(String::as_str));
            let term_list = placeholders(terms.len(), 1);

            {
                let mut stmt = tx
                    .prepare(&format!(
                        "SELECT term, COUNT(*) FROM chunk_terms
                         WHERE knowledge_base_id = ?1 AND term IN ({})
                         GROUP BY term",
                        term_list
                    ))
                    .map_err(db_err("read document frequencies"))?;
                let rows = stmt
                    .query_map(params_from_iter(bind.iter()), |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                    })
                    .map_err(db_err("read document frequencies"))?;
                for row in rows {
                    let (term, df) = row.map_err(db_err("read document frequencies"))?;
                    snapshot.document_frequencies.insert(term, df as usize);
                }
            }

            let mut postings: HashMap<String, Posting> = HashMap::new();
            {
                let mut stmt = tx
                    .prepare(&format!(
                        "SELECT t.chunk_id, c.term_count, t.term, t.frequency
                         FROM chunk_terms t JOIN document_chunks c ON c.id = t.chunk_id
                         WHERE t.knowledge_base_id = ?1 AND t.term IN ({})",
                        term_list
                    ))
                    .map_err(db_err("read postings"))?;
                let rows = stmt
                    .query_map(params_from_iter(bind.iter()), |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, i64>(3)?,
                        ))
                    })
                    .map_err(db_err("read postings"))?;

                for row in rows {
                    let (chunk_id, length, term, frequency) = row.map_err(db_err("read postings"))?;
                    let posting = match postings.entry(chunk_id) {
                        std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
                        std::collections::hash_map::Entry::Vacant(e) => {
                            let id = ChunkId::new(e.key().clone()).map_err(corrupt)?;
                            e.insert(Posting {
                                chunk_id: id,
                                length: length as usize,
                                term_frequencies: HashMap::new(),
                            })
                        }
                    };
                    posting.term_frequencies.insert(term, frequency as u32);
                }
            }

            let mut postings: Vec<Posting> = postings.into_values().collect();
            postings.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
            snapshot.postings = postings;

            tx.commit().map_err(db_err("end snapshot"))?;
            Ok(snapshot)
        })
        .await
    }

    async fn close(&self) {
        let result = self
            .with_conn(|conn| {
                conn.execute_batch("PRAGMA optimize;")
                    .map_err(db_err("optimize"))
            })
            .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to optimize SQLite store on close");
        }
        debug!(path = ?self.path, "Closed SQLite knowledge store");
    }
}
