//! Storage infrastructure - Knowledge store backends

mod factory;
pub mod migrations;
mod postgres;
mod sqlite;
mod transfer;

pub use factory::{StorageConfig, StorageFactory, StorageType};
pub use migrations::{Migration, Migrator, PostgresMigrator, SqliteMigrator};
pub use postgres::{PostgresConfig, PostgresKnowledgeStore};
pub use sqlite::SqliteKnowledgeStore;
pub use transfer::{StoreTransfer, TransferReport};
