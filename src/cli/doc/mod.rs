//! Doc command - document ingestion and management

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand};

use super::{emit, GlobalArgs};
use crate::config::AppConfig;
use crate::domain::ingestion::IngestDocument;
use crate::domain::knowledge_base::{DocumentId, KnowledgeBaseId};
use crate::infrastructure::services::KnowledgeBaseService;
use crate::infrastructure::storage::StorageFactory;
use crate::AppContext;

#[derive(Args, Clone)]
pub struct DocArgs {
    #[command(subcommand)]
    pub action: DocAction,
}

#[derive(Subcommand, Clone)]
pub enum DocAction {
    /// Chunk, embed and store an extracted UTF-8 text file
    Ingest {
        /// Target knowledge base
        #[arg(long = "kb")]
        knowledge_base: String,
        path: PathBuf,
        /// Name recorded for provenance; defaults to the file name
        #[arg(long)]
        filename: Option<String>,
        /// Replace the chunks of an existing document
        #[arg(long)]
        document_id: Option<String>,
        #[arg(long)]
        content_type: Option<String>,
    },
    /// List documents of a knowledge base, newest first
    List {
        #[arg(long = "kb")]
        knowledge_base: String,
    },
    /// Delete a document and its chunks
    Delete { document_id: String },
}

pub async fn run(config: &AppConfig, globals: &GlobalArgs, args: DocArgs) -> anyhow::Result<()> {
    match args.action {
        DocAction::List { knowledge_base } => list(config, globals, &knowledge_base).await,
        DocAction::Ingest {
            knowledge_base,
            path,
            filename,
            document_id,
            content_type,
        } => {
            let text = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read {} as UTF-8 text", path.display()))?;
            let filename = match filename {
                Some(name) => name,
                None => path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .context("path has no file name; pass --filename")?,
            };

            let mut input = IngestDocument::new(KnowledgeBaseId::new(knowledge_base)?, filename, text);
            if let Some(id) = document_id {
                input = input.with_document_id(DocumentId::new(id)?);
            }
            if let Some(content_type) = content_type {
                input = input.with_content_type(content_type);
            }

            let context = AppContext::from_config(config).await?;
            let result = ingest(&context, globals, input).await;
            context.shutdown().await;
            result
        }
        DocAction::Delete { document_id } => {
            let document_id = DocumentId::new(document_id)?;
            let context = AppContext::from_config(config).await?;
            let result = delete(&context, globals, &document_id).await;
            context.shutdown().await;
            result
        }
    }
}

async fn list(config: &AppConfig, globals: &GlobalArgs, knowledge_base: &str) -> anyhow::Result<()> {
    let owner = globals.require_owner()?;
    let store = StorageFactory::from_settings(&config.storage, config.embedding.dimensions).await?;
    let service = KnowledgeBaseService::new(store.clone());

    let result = match service.list_documents(&owner, knowledge_base).await {
        Ok(documents) => emit(globals, &documents, |documents| {
            for document in documents {
                println!(
                    "{}\t{}\t{} chunks\t{}",
                    document.id(),
                    document.filename(),
                    document.chunk_count(),
                    document.created_at().format("%Y-%m-%d %H:%M:%S")
                );
            }
        }),
        Err(e) => Err(e.into()),
    };

    store.close().await;
    result
}

async fn ingest(context: &AppContext, globals: &GlobalArgs, input: IngestDocument) -> anyhow::Result<()> {
    let owner = globals.require_owner()?;
    let report = context.pipeline.ingest(&owner, input).await?;

    emit(globals, &report, |r| {
        println!(
            "Ingested {} as {}: {} chunks ({} replaced) in {} ms",
            r.filename, r.document_id, r.chunks_created, r.chunks_replaced, r.elapsed_ms
        )
    })
}

async fn delete(context: &AppContext, globals: &GlobalArgs, document_id: &DocumentId) -> anyhow::Result<()> {
    let owner = globals.require_owner()?;
    let deleted = context.pipeline.delete_document(&owner, document_id).await?;

    emit(globals, &deleted, |deleted| {
        if *deleted {
            println!("Deleted document {}", document_id);
        } else {
            println!("Document {} not found", document_id);
        }
    })
}
