//! Transfer command - copies knowledge bases between storage backends

use clap::Args;
use tracing::info;

use super::{emit, GlobalArgs};
use crate::config::AppConfig;
use crate::infrastructure::storage::{StorageConfig, StorageFactory, StoreTransfer};

#[derive(Args, Clone)]
pub struct TransferArgs {
    /// Source: a SQLite file path or a postgres:// URL
    #[arg(long)]
    pub from: String,

    /// Target: a SQLite file path or a postgres:// URL
    #[arg(long)]
    pub to: String,

    /// Embedding dimensionality of both stores (defaults to embedding.dimensions)
    #[arg(long)]
    pub dimensions: Option<usize>,
}

/// Interpret a location as a PostgreSQL URL or a SQLite path
pub fn parse_location(location: &str) -> StorageConfig {
    if location.starts_with("postgres://") || location.starts_with("postgresql://") {
        StorageConfig::postgres_url(location)
    } else {
        StorageConfig::sqlite(location)
    }
}

/// Without `--owner`, every owner's data is copied
pub async fn run(config: &AppConfig, globals: &GlobalArgs, args: TransferArgs) -> anyhow::Result<()> {
    let dimensions = args.dimensions.unwrap_or(config.embedding.dimensions);
    let owner = globals.owner()?;

    let source = StorageFactory::create(&parse_location(&args.from), dimensions).await?;
    let target = StorageFactory::create(&parse_location(&args.to), dimensions).await?;
    info!(
        source = source.backend_name(),
        target = target.backend_name(),
        dimensions,
        "Starting transfer"
    );

    let transfer = StoreTransfer::new(source.clone(), target.clone())?;
    let result = match &owner {
        Some(owner) => transfer.transfer_owner(owner).await,
        None => transfer.transfer_all().await,
    };

    source.close().await;
    target.close().await;

    let report = result?;
    emit(globals, &report, |r| {
        println!(
            "Transferred {} owners, {} knowledge bases, {} documents, {} chunks",
            r.owners, r.knowledge_bases, r.documents, r.chunks
        )
    })
}
