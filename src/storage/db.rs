use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

use super::types::StorageError;

/// Current time as unix microseconds.
///
/// Microsecond resolution keeps retention cutoffs strict: an entry stamped
/// exactly at the cutoff survives, one microsecond older does not.
pub(crate) fn now_micros() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

// ============================================================================
// Database
// ============================================================================

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations.
    pub async fn open(path: &str) -> Result<Self, StorageError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // busy_timeout=5000: wait up to 5s for locks before SQLITE_BUSY, so
        // concurrent fetches and sweeps ride out transient contention.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(StorageError::Other)?
            .pragma("busy_timeout", "5000");
        // SQLite is single-writer; 5 connections covers concurrent source
        // fetches plus listing queries.
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.migrate()
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))?;
        Ok(db)
    }

    /// Run schema migrations atomically within a transaction.
    ///
    /// All statements use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<()> {
        // Per-connection setting, must stay outside the transaction.
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&self.pool)
            .await?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                url TEXT NOT NULL,
                url_hash TEXT UNIQUE NOT NULL,
                site_url TEXT,
                description TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                fetch_interval_minutes INTEGER,
                allow_ssl_bypass INTEGER NOT NULL DEFAULT 1,
                last_fetched_at INTEGER,
                last_fetch_status TEXT NOT NULL DEFAULT 'pending',
                last_fetch_error TEXT,
                fetch_count INTEGER NOT NULL DEFAULT 0,
                entry_count INTEGER NOT NULL DEFAULT 0,
                unread_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // source_id is nullable: preserved entries outlive their source, with
        // source_name as the provenance snapshot. The UNIQUE constraint does
        // not bind rows with NULL source_id (SQLite treats NULLs as
        // distinct), which is exactly what lets orphans coexist.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                id INTEGER PRIMARY KEY,
                source_id INTEGER REFERENCES sources(id) ON DELETE SET NULL,
                source_name TEXT NOT NULL,
                title TEXT NOT NULL,
                link TEXT NOT NULL,
                author TEXT,
                published_at INTEGER,
                content TEXT,
                content_hash TEXT NOT NULL,
                guid TEXT,
                status TEXT NOT NULL DEFAULT 'unread',
                is_read INTEGER NOT NULL DEFAULT 0,
                marked_at INTEGER,
                summary TEXT,
                content_type TEXT,
                analyzed_at INTEGER,
                notes TEXT,
                display_order INTEGER NOT NULL DEFAULT 0,
                exported INTEGER NOT NULL DEFAULT 0,
                export_key TEXT,
                fetched_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                expires_at INTEGER,
                UNIQUE(source_id, content_hash)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_source ON entries(source_id)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_hash ON entries(content_hash)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_status ON entries(status)")
            .execute(&mut *tx)
            .await?;
        // Sweeper passes filter by status and compare a timestamp.
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_entries_status_fetched ON entries(status, fetched_at)",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_entries_status_marked ON entries(status, marked_at)",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS shares (
                id INTEGER PRIMARY KEY,
                code TEXT UNIQUE NOT NULL,
                kind TEXT NOT NULL DEFAULT 'entries',
                entry_ids TEXT,
                body TEXT,
                title TEXT,
                created_at INTEGER NOT NULL,
                expires_at INTEGER
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
