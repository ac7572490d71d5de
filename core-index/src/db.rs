//! Connection pool for the index database.
//!
//! File-backed indexes run in WAL mode with `synchronous = FULL`, so a write
//! that returned is durable and readers never wait on the writer. Migrations
//! are embedded and applied every time a pool is opened.

use crate::{IndexError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexLocation {
    File(PathBuf),
    /// Private to the pool's single connection
    Memory,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub location: IndexLocation,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            location: IndexLocation::File(path.into()),
            max_connections: 4,
            acquire_timeout: Duration::from_secs(30),
        }
    }

    /// Each connection to `:memory:` sees its own empty database, so the
    /// pool holds exactly one connection for its whole life.
    pub fn in_memory() -> Self {
        Self {
            location: IndexLocation::Memory,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        if self.location != IndexLocation::Memory {
            self.max_connections = max.max(1);
        }
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        let options = SqliteConnectOptions::new()
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(BUSY_TIMEOUT);

        match &self.location {
            IndexLocation::File(path) => options
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal),
            IndexLocation::Memory => options.in_memory(true),
        }
    }
}

/// Open the pool and bring the schema up to date.
pub async fn create_pool(config: DatabaseConfig) -> Result<SqlitePool> {
    debug!(location = ?config.location, "Opening index database");

    let mut pool_options = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout);
    if config.location == IndexLocation::Memory {
        pool_options = pool_options
            .min_connections(1)
            .max_lifetime(None)
            .idle_timeout(None);
    }

    let pool = pool_options
        .connect_with(config.connect_options())
        .await
        .map_err(|e| {
            warn!(error = %e, location = ?config.location, "Cannot open index database");
            IndexError::Database(e)
        })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| IndexError::Migration(e.to_string()))?;

    sqlx::query("SELECT 1").execute(&pool).await?;
    Ok(pool)
}

/// In-memory pool with the schema applied.
pub async fn create_test_pool() -> Result<SqlitePool> {
    create_pool(DatabaseConfig::in_memory()).await
}
