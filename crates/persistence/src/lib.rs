//! Persistence layer for Bridge Scan
//!
//! SQLite storage for the draw history and the managed pattern registry.
//! The engine only talks to these tables through its collaborator traits.

pub mod repository;
pub mod schema;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
pub use sqlx::sqlite::SqlitePool;
use thiserror::Error;
use tracing::{debug, info};

use crate::schema::{statements, ADDED_COLUMNS, CREATE_TABLES};

/// Retention writes contend with scans; wait this long for a lock instead of failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const FILE_POOL_SIZE: u32 = 5;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection pool
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database file at `path` and bring the schema up to date
    pub async fn new(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DbError::Connection(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        Self::open(options, FILE_POOL_SIZE).await
    }

    /// Create an in-memory database (for testing)
    pub async fn in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // Every new in-memory connection is a fresh database, so keep exactly one
        Self::open(options, 1).await
    }

    /// Pragmas ride on the connect options so every pooled connection gets them
    async fn open(options: SqliteConnectOptions, max_connections: u32) -> DbResult<Self> {
        let options = options
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Create missing tables and indexes, then add any column older files lack
    async fn run_migrations(&self) -> DbResult<()> {
        for sql in statements(CREATE_TABLES) {
            sqlx::query(&sql)
                .execute(&self.pool)
                .await
                .map_err(|e| DbError::Migration(format!("{e}: {sql}")))?;
        }

        for added in ADDED_COLUMNS {
            if self.has_column(added.table, added.column).await? {
                continue;
            }
            let sql = added.sql();
            sqlx::query(&sql)
                .execute(&self.pool)
                .await
                .map_err(|e| DbError::Migration(format!("{e}: {sql}")))?;
            info!(table = added.table, column = added.column, "Added column");
        }

        debug!("Schema up to date");
        Ok(())
    }

    async fn has_column(&self, table: &str, column: &str) -> DbResult<bool> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
                .bind(table)
                .bind(column)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Clone the pool for use in spawned tasks
    pub fn pool_clone(&self) -> SqlitePool {
        self.pool.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_schema_is_created() {
        let db = Database::in_memory().await.unwrap();
        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('draws', 'managed_patterns') ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .unwrap();

        let names: Vec<String> = tables.into_iter().map(|(n,)| n).collect();
        assert_eq!(names, vec!["draws".to_string(), "managed_patterns".to_string()]);
        assert!(db.has_column("managed_patterns", "max_lose_streak").await.unwrap());
        assert!(!db.has_column("managed_patterns", "no_such_column").await.unwrap());
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        assert!(db.has_column("managed_patterns", "max_lose_streak").await.unwrap());
    }

    #[tokio::test]
    async fn test_busy_timeout_applies_to_pooled_connections() {
        let db = Database::in_memory().await.unwrap();
        let (timeout,): (i64,) = sqlx::query_as("PRAGMA busy_timeout")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(timeout, 5000);
    }
}
