//! Command-line surface
//!
//! - `migrate`: apply, revert or inspect the schema
//! - `kb`: create, list, rename and delete knowledge bases
//! - `doc`: ingest, list and delete documents
//! - `search`: hybrid retrieval over one or more knowledge bases
//! - `transfer`: copy data between storage backends

pub mod doc;
pub mod kb;
pub mod migrate;
pub mod search;
pub mod transfer;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::config::AppConfig;
use crate::domain::knowledge_base::OwnerId;
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::observability::describe_metrics;

/// Knowledge base hybrid retrieval
#[derive(Parser)]
#[command(name = "kb-retrieval")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Tenant on whose behalf the command runs
    #[arg(long, global = true, env = "KBR_OWNER")]
    pub owner: Option<String>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage the database schema
    Migrate(migrate::MigrateArgs),

    /// Manage knowledge bases
    Kb(kb::KbArgs),

    /// Manage documents
    Doc(doc::DocArgs),

    /// Search knowledge bases
    Search(search::SearchArgs),

    /// Copy knowledge bases between backends
    Transfer(transfer::TransferArgs),
}

/// Options shared by every subcommand
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub owner: Option<String>,
    pub json: bool,
}

impl GlobalArgs {
    /// The owner, which most subcommands cannot run without
    pub fn require_owner(&self) -> anyhow::Result<OwnerId> {
        let owner = self
            .owner
            .as_deref()
            .context("--owner (or KBR_OWNER) is required for this command")?;
        Ok(OwnerId::new(owner)?)
    }

    pub fn owner(&self) -> anyhow::Result<Option<OwnerId>> {
        Ok(self.owner.as_deref().map(OwnerId::new).transpose()?)
    }
}

/// Load configuration, install logging and describe metrics
pub fn bootstrap() -> anyhow::Result<AppConfig> {
    let config = AppConfig::load()?;
    init_logging(&config.logging);
    describe_metrics();
    Ok(config)
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = bootstrap()?;
    let globals = GlobalArgs {
        owner: cli.owner,
        json: cli.json,
    };

    match cli.command {
        Command::Migrate(args) => migrate::run(&config, args).await,
        Command::Kb(args) => kb::run(&config, &globals, args).await,
        Command::Doc(args) => doc::run(&config, &globals, args).await,
        Command::Search(args) => search::run(&config, &globals, args).await,
        Command::Transfer(args) => transfer::run(&config, &globals, args).await,
    }
}

/// Print `value` as JSON, or through `human` otherwise
pub(crate) fn emit<T, F>(globals: &GlobalArgs, value: &T, human: F) -> anyhow::Result<()>
where
    T: Serialize,
    F: FnOnce(&T),
{
    if globals.json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search() {
        let cli = Cli::try_parse_from([
            "kb-retrieval",
            "--owner",
            "alice",
            "search",
            "where is the eiffel tower",
            "--kb",
            "kb-1",
            "--kb",
            "kb-2",
            "--top-k",
            "3",
        ])
        .unwrap();

        assert_eq!(cli.owner.as_deref(), Some("alice"));
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.knowledge_bases, vec!["kb-1", "kb-2"]);
                assert_eq!(args.top_k, Some(3));
                assert_eq!(args.vector_weight, None);
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn test_owner_reads_environment_variable() {
        let command = Cli::command();
        let owner = command
            .get_arguments()
            .find(|arg| arg.get_id() == "owner")
            .unwrap();

        assert_eq!(owner.get_env(), Some(std::ffi::OsStr::new("KBR_OWNER")));
    }

    #[test]
    fn test_require_owner() {
        let globals = GlobalArgs {
            owner: None,
            json: false,
        };
        assert!(globals.require_owner().is_err());

        let globals = GlobalArgs {
            owner: Some("alice".to_string()),
            json: true,
        };
        assert_eq!(globals.require_owner().unwrap().as_str(), "alice");
    }
}
