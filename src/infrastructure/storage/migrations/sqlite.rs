//! SQLite migrator

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use super::{Migration, Migrator};
use crate::domain::DomainError;

#[derive(Debug)]
pub struct SqliteMigrator {
    conn: Arc<Mutex<Connection>>,
    migrations: Vec<Migration>,
}

impl SqliteMigrator {
    pub fn new(conn: Arc<Mutex<Connection>>, migrations: Vec<Migration>) -> Self {
        Self { conn, migrations }
    }

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

fn ensure_migrations_table(conn: &Connection) -> Result<(), DomainError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            installed_on TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .map_err(|e| DomainError::storage(format!("Failed to create migrations table: {}", e)))
}

fn current_version(conn: &Connection) -> Result<Option<i64>, DomainError> {
    conn.query_row("SELECT MAX(version) FROM _migrations", [], |row| row.get(0))
        .map_err(|e| DomainError::storage(format!("Failed to get migration version: {}", e)))
}

fn apply(conn: &mut Connection, migration: &Migration) -> Result<bool, DomainError> {
    let applied = conn
        .query_row(
            "SELECT version FROM _migrations WHERE version = ?1",
            params![migration.version],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .map_err(|e| DomainError::storage(format!("Failed to check migration status: {}", e)))?;

    if applied.is_some() {
        return Ok(false);
    }

    let tx = conn
        .transaction()
        .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;

    tx.execute_batch(&migration.up).map_err(|e| {
        DomainError::storage(format!(
            "Failed to run migration {}: {}",
            migration.version, e
        ))
    })?;

    tx.execute(
        "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
        params![migration.version, migration.description],
    )
    .map_err(|e| {
        DomainError::storage(format!(
            "Failed to record migration {}: {}",
            migration.version, e
        ))
    })?;

    tx.commit()
        .map_err(|e| DomainError::storage(format!("Failed to commit migration: {}", e)))?;

    Ok(true)
}

#[async_trait]
impl Migrator for SqliteMigrator {
    async fn run(&self) -> Result<(), DomainError> {
        let migrations = self.migrations.clone();

        let applied = self
            .with_conn(move |conn| {
                ensure_migrations_table(conn)?;
                let mut applied = Vec::new();
                for migration in &migrations {
                    if apply(conn, migration)? {
                        applied.push(migration.version);
                    }
                }
                Ok(applied)
            })
            .await?;

        for version in applied {
            info!(version, "Applied migration");
        }
        Ok(())
    }

    async fn revert(&self) -> Result<(), DomainError> {
        let migrations = self.migrations.clone();

        self.with_conn(move |conn| {
            ensure_migrations_table(conn)?;
            let Some(version) = current_version(conn)? else {
                return Ok(());
            };
            let migration = migrations
                .iter()
                .find(|m| m.version == version)
                .ok_or_else(|| {
                    DomainError::storage(format!("Unknown migration version {}", version))
                })?;

            let tx = conn
                .transaction()
                .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;
            tx.execute_batch(&migration.down).map_err(|e| {
                DomainError::storage(format!("Failed to revert migration {}: {}", version, e))
            })?;
            tx.execute("DELETE FROM _migrations WHERE version = ?1", params![version])
                .map_err(|e| {
                    DomainError::storage(format!(
                        "Failed to remove migration record {}: {}",
                        version, e
                    ))
                })?;
            tx.commit()
                .map_err(|e| DomainError::storage(format!("Failed to commit revert: {}", e)))
        })
        .await
    }

    async fn version(&self) -> Result<Option<i64>, DomainError> {
        self.with_conn(|conn| {
            ensure_migrations_table(conn)?;
            current_version(conn)
        })
        .await
    }
}
