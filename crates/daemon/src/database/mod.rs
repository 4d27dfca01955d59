//! Local Index: durable per-folder record of capture and upload progress
//!
//! One SQLite file per managed folder. Rows are keyed by the magic (flattened)
//! relative path, plus the author's public key for local snapshots. Snapshot
//! chains are stored as one JSON document per row, so a row is only ever
//! replaced whole.

use std::path::Path;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Row;
use thiserror::Error;
use tracing::info;

use common::magic_path::MagicPathError;

mod conflict_queries;
mod snapshot_queries;

pub use conflict_queries::ConflictRecord;
pub use snapshot_queries::UploadOutcome;

/// The only schema version this build reads or writes
pub const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl std::ops::Deref for Database {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("unsupported schema version {found} (this build supports {supported})")]
    UnsupportedSchema { found: i64, supported: i64 },

    #[error("failed to create database directory: {0}")]
    Directory(#[source] std::io::Error),

    #[error("corrupt snapshot record: {0}")]
    Record(#[from] serde_json::Error),

    #[error("corrupt path key: {0}")]
    Path(#[from] MagicPathError),
}

impl Database {
    /// Open (creating if missing) the index at `path`
    ///
    /// Fails with [`DatabaseError::UnsupportedSchema`] when the file was
    /// written by a different schema version; nothing is migrated.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DatabaseError::Directory)?;
        }

        // a write is on disk before the statement returns
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        info!(path = %path.display(), "local index opened");
        Ok(db)
    }

    /// A throwaway index; everything is lost when the last handle drops
    pub async fn in_memory() -> Result<Self, DatabaseError> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);

        // the database lives and dies with its one connection
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("CREATE TABLE IF NOT EXISTS version (version INTEGER NOT NULL)")
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query("SELECT version FROM version LIMIT 1")
            .fetch_optional(&mut *tx)
            .await?;
        match row.map(|r| r.get::<i64, _>("version")) {
            Some(found) if found != SCHEMA_VERSION => {
                return Err(DatabaseError::UnsupportedSchema {
                    found,
                    supported: SCHEMA_VERSION,
                });
            }
            Some(_) => {}
            None => {
                sqlx::query("INSERT INTO version (version) VALUES (?1)")
                    .bind(SCHEMA_VERSION)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS local_snapshots (
                relpath TEXT NOT NULL,
                author TEXT NOT NULL,
                snapshot TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (relpath, author)
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS remote_snapshots (
                relpath TEXT PRIMARY KEY,
                capability TEXT NOT NULL,
                snapshot TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conflicts (
                relpath TEXT NOT NULL,
                capability TEXT NOT NULL,
                author TEXT NOT NULL,
                recorded_at INTEGER NOT NULL,
                PRIMARY KEY (relpath, capability)
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// The schema version recorded in the file
    pub async fn schema_version(&self) -> Result<i64, DatabaseError> {
        let row = sqlx::query("SELECT version FROM version LIMIT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("version"))
    }
}

fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
