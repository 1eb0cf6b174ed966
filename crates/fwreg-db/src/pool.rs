//! SQLite connection pool.

use crate::error::DbError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

/// Shared SQLite pool.
#[derive(Debug, Clone)]
pub struct DbPool {
    pool: SqlitePool,
}

impl DbPool {
    /// Open (creating if needed) the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `DbError::ConnectionFailed` if the file cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(DbError::ConnectionFailed)?;

        tracing::info!(path = %path.as_ref().display(), "Opened SQLite database");
        Ok(Self { pool })
    }

    /// A private in-memory database. One connection, so every query sees
    /// the same data.
    ///
    /// # Errors
    ///
    /// Returns `DbError::ConnectionFailed` if SQLite cannot be initialised.
    pub async fn in_memory() -> Result<Self, DbError> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(DbError::ConnectionFailed)?;
        Ok(Self { pool })
    }

    /// The underlying sqlx pool.
    #[must_use]
    pub fn inner(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close all connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
