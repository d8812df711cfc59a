//! SQLite-based cache store

use crate::cache::{CacheEntry, CacheEntrySummary, CacheStore, PutOutcome};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;

/// SQLite cache store
pub struct SqliteCacheStore {
    pool: SqlitePool,
}

impl SqliteCacheStore {
    /// Open (and create if needed) a store at `db_path`
    pub async fn new(db_path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open cache database {}", db_path.display()))?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("ci-matrix");
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("Failed to create {}", db_dir.display()))?;

        Self::new(&db_dir.join("cache.db")).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL UNIQUE,
                payload BLOB NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create cache table")?;

        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> CacheEntry {
        CacheEntry {
            key: row.get("key"),
            payload: row.get("payload"),
            created_at: Self::from_naive(row.get("created_at")),
        }
    }
}

#[async_trait::async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let row = sqlx::query(
            r#"
            SELECT key, payload, created_at
            FROM cache_entries
            WHERE key = ?1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load cache entry")?;

        Ok(row.as_ref().map(Self::entry_from_row))
    }

    async fn get_by_prefix(&self, prefix: &str) -> Result<Option<CacheEntry>> {
        // substr comparison avoids LIKE wildcard escaping
        let row = sqlx::query(
            r#"
            SELECT key, payload, created_at
            FROM cache_entries
            WHERE substr(key, 1, length(?1)) = ?1
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load cache entry by prefix")?;

        Ok(row.as_ref().map(Self::entry_from_row))
    }

    async fn put(&self, entry: CacheEntry) -> Result<PutOutcome> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO cache_entries (key, payload, created_at)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(&entry.key)
        .bind(&entry.payload)
        .bind(Self::to_naive(entry.created_at))
        .execute(&self.pool)
        .await
        .context("Failed to save cache entry")?;

        if result.rows_affected() == 0 {
            Ok(PutOutcome::AlreadyExists)
        } else {
            Ok(PutOutcome::Stored)
        }
    }

    async fn list(&self) -> Result<Vec<CacheEntrySummary>> {
        let rows = sqlx::query(
            r#"
            SELECT key, length(payload) AS size_bytes, created_at
            FROM cache_entries
            ORDER BY id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list cache entries")?;

        Ok(rows
            .iter()
            .map(|row| CacheEntrySummary {
                key: row.get("key"),
                size_bytes: row.get::<i64, _>("size_bytes") as usize,
                created_at: Self::from_naive(row.get("created_at")),
            })
            .collect())
    }
}
