//! Kb command - knowledge base management

use clap::{Args, Subcommand};

use super::{emit, GlobalArgs};
use crate::config::AppConfig;
use crate::domain::knowledge_base::OwnerId;
use crate::infrastructure::services::{
    CreateKnowledgeBaseRequest, KnowledgeBaseService, UpdateKnowledgeBaseRequest,
};
use crate::infrastructure::storage::StorageFactory;

#[derive(Args, Clone)]
pub struct KbArgs {
    #[command(subcommand)]
    pub action: KbAction,
}

#[derive(Subcommand, Clone)]
pub enum KbAction {
    /// Create a knowledge base
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Explicit id instead of a generated one
        #[arg(long)]
        id: Option<String>,
    },
    /// List your knowledge bases, newest first
    List,
    /// Rename a knowledge base or change its description
    Rename {
        id: String,
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, conflicts_with = "description")]
        clear_description: bool,
    },
    /// Delete a knowledge base with all documents
    Delete { id: String },
}

pub async fn run(config: &AppConfig, globals: &GlobalArgs, args: KbArgs) -> anyhow::Result<()> {
    let owner = globals.require_owner()?;
    let store = StorageFactory::from_settings(&config.storage, config.embedding.dimensions).await?;
    let service = KnowledgeBaseService::new(store.clone());

    let result = execute(&service, &owner, globals, args.action).await;

    store.close().await;
    result
}

async fn execute(
    service: &KnowledgeBaseService,
    owner: &OwnerId,
    globals: &GlobalArgs,
    action: KbAction,
) -> anyhow::Result<()> {
    match action {
        KbAction::Create {
            name,
            description,
            id,
        } => {
            let request = CreateKnowledgeBaseRequest {
                id,
                name,
                description,
            };
            let kb = service.create(owner, request).await?;
            emit(globals, &kb, |kb| println!("Created knowledge base {} ({})", kb.id(), kb.name()))
        }
        KbAction::List => {
            let kbs = service.list(owner).await?;
            emit(globals, &kbs, |kbs| {
                for kb in kbs {
                    println!(
                        "{}\t{}\t{}",
                        kb.id(),
                        kb.name(),
                        kb.created_at().format("%Y-%m-%d %H:%M:%S")
                    );
                }
            })
        }
        KbAction::Rename {
            id,
            name,
            description,
            clear_description,
        } => {
            let description = if clear_description {
                Some(None)
            } else {
                description.map(Some)
            };
            let kb = service
                .update(owner, &id, UpdateKnowledgeBaseRequest { name, description })
                .await?;
            emit(globals, &kb, |kb| println!("Updated knowledge base {} ({})", kb.id(), kb.name()))
        }
        KbAction::Delete { id } => {
            let deleted = service.delete(owner, &id).await?;
            emit(globals, &deleted, |deleted| {
                if *deleted {
                    println!("Deleted knowledge base {}", id);
                } else {
                    println!("Knowledge base {} was already gone", id);
                }
            })
        }
    }
}
