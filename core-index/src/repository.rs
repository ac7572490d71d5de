//! Cache index repository
//!
//! Durable side table used for listing, size aggregation and eviction
//! ordering without walking the cache directory.

use crate::error::{IndexError, Result};
use crate::models::IndexRow;
use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};
use tracing::{debug, error, instrument};

/// Repository trait for cache index operations.
///
/// Every mutation is committed before the call returns.
#[async_trait]
pub trait CacheIndex: Send + Sync {
    /// Insert or fully replace the row for `(tag, id)`. Last write wins.
    async fn upsert(&self, row: &IndexRow) -> Result<()>;

    /// Update only the last-access timestamp. No-op when the row is absent.
    async fn touch(&self, tag: &str, id: i64, accessed_at: i64) -> Result<()>;

    /// Delete the row. No-op when the row is absent.
    async fn remove(&self, tag: &str, id: i64) -> Result<()>;

    /// Sum of `size` over all rows, zero when empty.
    async fn total_size(&self) -> Result<u64>;

    /// Number of rows.
    async fn count(&self) -> Result<u64>;

    /// All rows, no ordering guarantee.
    async fn list_all(&self) -> Result<Vec<IndexRow>>;

    /// All rows, oldest access first; ties broken by creation time.
    async fn list_oldest_first(&self) -> Result<Vec<IndexRow>>;

    /// Delete every row.
    async fn clear(&self) -> Result<()>;
}

/// SQLite implementation of [`CacheIndex`].
#[derive(Clone)]
pub struct SqliteCacheIndex {
    pool: SqlitePool,
}

impl SqliteCacheIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl CacheIndex for SqliteCacheIndex {
    #[instrument(skip(self, row), fields(tag = %row.tag, id = row.id))]
    async fn upsert(&self, row: &IndexRow) -> Result<()> {
        row.validate().map_err(IndexError::InvalidRow)?;

        sqlx::query(
            r#"
            INSERT INTO entries (
                tag, id, folder, audio_file, lyrics_file, cover_file,
                duration_seconds, bitrate_kbps, size, created_at, last_accessed_at,
                mime_type, extension, source_url
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(tag, id) DO UPDATE SET
                folder = excluded.folder,
                audio_file = excluded.audio_file,
                lyrics_file = excluded.lyrics_file,
                cover_file = excluded.cover_file,
                duration_seconds = excluded.duration_seconds,
                bitrate_kbps = excluded.bitrate_kbps,
                size = excluded.size,
                created_at = excluded.created_at,
                last_accessed_at = excluded.last_accessed_at,
                mime_type = excluded.mime_type,
                extension = excluded.extension,
                source_url = excluded.source_url
            "#,
        )
        .bind(&row.tag)
        .bind(row.id)
        .bind(&row.folder)
        .bind(&row.audio_file)
        .bind(&row.lyrics_file)
        .bind(&row.cover_file)
        .bind(row.duration_seconds)
        .bind(row.bitrate_kbps)
        .bind(row.size)
        .bind(row.created_at)
        .bind(row.last_accessed_at)
        .bind(&row.mime_type)
        .bind(&row.extension)
        .bind(&row.source_url)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to upsert index row: {}", e);
            IndexError::Database(e)
        })?;

        debug!(size = row.size, "Index row upserted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn touch(&self, tag: &str, id: i64, accessed_at: i64) -> Result<()> {
        sqlx::query("UPDATE entries SET last_accessed_at = ? WHERE tag = ? AND id = ?")
            .bind(accessed_at)
            .bind(tag)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, tag: &str, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM entries WHERE tag = ? AND id = ?")
            .bind(tag)
            .bind(id)
            .execute(&self.pool)
            .await?;

        debug!(removed = result.rows_affected(), "Index row removed");
        Ok(())
    }

    async fn total_size(&self) -> Result<u64> {
        let total: (i64,) = query_as("SELECT COALESCE(SUM(size), 0) FROM entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(total.0.max(0) as u64)
    }

    async fn count(&self) -> Result<u64> {
        let count: (i64,) = query_as("SELECT COUNT(*) FROM entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0.max(0) as u64)
    }

    async fn list_all(&self) -> Result<Vec<IndexRow>> {
        let rows = query_as::<_, IndexRow>("SELECT * FROM entries")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn list_oldest_first(&self) -> Result<Vec<IndexRow>> {
        let rows = query_as::<_, IndexRow>(
            "SELECT * FROM entries ORDER BY last_accessed_at ASC, created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<()> {
        let result = sqlx::query("DELETE FROM entries")
            .execute(&self.pool)
            .await?;
        debug!(removed = result.rows_affected(), "Index cleared");
        Ok(())
    }
}
