//! Migrate command - applies, reverts or reports schema migrations

use clap::{Args, Subcommand};
use tracing::info;

use crate::config::AppConfig;
use crate::infrastructure::storage::{StorageConfig, StorageFactory};

#[derive(Args, Clone)]
pub struct MigrateArgs {
    #[command(subcommand)]
    pub action: Option<MigrateAction>,
}

#[derive(Subcommand, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MigrateAction {
    /// Apply every pending migration (default)
    Run,
    /// Revert the most recent migration
    Revert,
    /// Print the current schema version
    Status,
}

pub async fn run(config: &AppConfig, args: MigrateArgs) -> anyhow::Result<()> {
    let storage = StorageConfig::from_settings(&config.storage)?;
    let migrator = StorageFactory::migrator(&storage, config.embedding.dimensions).await?;
    let backend = storage.storage_type();

    match args.action.unwrap_or(MigrateAction::Run) {
        MigrateAction::Run => {
            migrator.run().await?;
            info!(backend = %backend, "Migrations applied");
        }
        MigrateAction::Revert => {
            migrator.revert().await?;
            info!(backend = %backend, "Last migration reverted");
        }
        MigrateAction::Status => {}
    }

    match migrator.version().await? {
        Some(version) => println!("{} schema version: {}", backend, version),
        None => println!("{} schema: no migrations applied", backend),
    }

    Ok(())
}
