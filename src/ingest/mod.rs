//! Ingestion pipeline: fetch a source's feed and reconcile its items into
//! the entry table.
//!
//! Each item resolves to exactly one of three outcomes:
//!
//! 1. already present in this source (by content hash) — skip
//! 2. present as an orphan (hash matches an entry with no source) — adopt it
//! 3. unseen — insert as a new UNREAD entry
//!
//! All writes for one fetch, counter deltas and source bookkeeping included,
//! go through a single transaction.

use futures::stream::{self, StreamExt};
use sqlx::{Sqlite, Transaction};
use thiserror::Error;

use crate::feed::{fetch, FetchError, ParsedItem};
use crate::storage::{apply_counter_delta, now_micros, Database, EntryStatus, Source, StorageError};
use crate::util::fingerprint;

const MAX_CONCURRENT_FETCHES: usize = 10;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Tally of one source's ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Items the feed offered after parsing.
    pub fetched: usize,
    /// Entries inserted fresh.
    pub new: usize,
    /// Orphans re-adopted by this source.
    pub reassociated: usize,
}

/// Outcome of ingesting one source, keyed for correlation.
pub struct IngestOutcome {
    pub source_id: i64,
    pub result: Result<IngestStats, IngestError>,
}

/// Fetch one source and reconcile its items.
///
/// A fetch or parse failure records the error on the source and inserts
/// nothing. A storage failure mid-reconciliation commits the items already
/// processed, with counter deltas matching exactly what was written, and
/// marks the source failed.
pub async fn ingest_source(
    db: &Database,
    client: &reqwest::Client,
    source: &Source,
) -> Result<IngestStats, IngestError> {
    let doc = match fetch(client, &source.url, source.allow_ssl_bypass).await {
        Ok(doc) => doc,
        Err(e) => {
            db.record_fetch_failure(source.id, &e.to_string()).await?;
            return Err(e.into());
        }
    };

    let mut tx = db.pool.begin().await.map_err(StorageError::from)?;
    let mut stats = IngestStats {
        fetched: doc.items.len(),
        ..Default::default()
    };
    let mut unread_added: i64 = 0;
    let mut failure: Option<StorageError> = None;

    for item in &doc.items {
        match resolve_item(&mut tx, source, item).await {
            Ok(Resolution::AlreadyPresent) => {}
            Ok(Resolution::Inserted) => {
                stats.new += 1;
                unread_added += 1;
            }
            Ok(Resolution::Reassociated { was_unread }) => {
                stats.reassociated += 1;
                if was_unread {
                    unread_added += 1;
                }
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    // Counter deltas cover exactly the items written above, even on the
    // partial-failure path.
    let entry_delta = (stats.new + stats.reassociated) as i64;
    apply_counter_delta(&mut tx, source.id, entry_delta, unread_added)
        .await
        .map_err(StorageError::from)?;

    let now = now_micros();
    let (status, error_text) = match &failure {
        None => ("success", None),
        Some(e) => ("failed", Some(e.to_string())),
    };
    sqlx::query(
        r#"
        UPDATE sources SET
            fetch_count = fetch_count + 1,
            last_fetched_at = ?,
            last_fetch_status = ?,
            last_fetch_error = ?,
            updated_at = ?
        WHERE id = ?
    "#,
    )
    .bind(now)
    .bind(status)
    .bind(error_text)
    .bind(now)
    .bind(source.id)
    .execute(&mut *tx)
    .await
    .map_err(StorageError::from)?;

    tx.commit().await.map_err(StorageError::from)?;

    match failure {
        None => {
            tracing::info!(
                source_id = source.id,
                name = %source.name,
                fetched = stats.fetched,
                new = stats.new,
                reassociated = stats.reassociated,
                "Ingested source"
            );
            Ok(stats)
        }
        Some(e) => {
            tracing::warn!(
                source_id = source.id,
                name = %source.name,
                new = stats.new,
                error = %e,
                "Ingestion failed mid-run, partial results committed"
            );
            Err(e.into())
        }
    }
}

enum Resolution {
    AlreadyPresent,
    Inserted,
    Reassociated { was_unread: bool },
}

async fn resolve_item(
    tx: &mut Transaction<'_, Sqlite>,
    source: &Source,
    item: &ParsedItem,
) -> Result<Resolution, StorageError> {
    let hash = fingerprint(&item.link, &item.title);

    let in_source: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM entries WHERE source_id = ? AND content_hash = ?")
            .bind(source.id)
            .bind(&hash)
            .fetch_optional(&mut **tx)
            .await?;
    if in_source.is_some() {
        return Ok(Resolution::AlreadyPresent);
    }

    // Oldest orphan wins when several carry the same hash.
    let orphan: Option<(i64, EntryStatus)> = sqlx::query_as(
        "SELECT id, status FROM entries
         WHERE source_id IS NULL AND content_hash = ?
         ORDER BY id LIMIT 1",
    )
    .bind(&hash)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some((orphan_id, status)) = orphan {
        sqlx::query(
            "UPDATE entries SET source_id = ?, source_name = ?, updated_at = ? WHERE id = ?",
        )
        .bind(source.id)
        .bind(&source.name)
        .bind(now_micros())
        .bind(orphan_id)
        .execute(&mut **tx)
        .await?;
        return Ok(Resolution::Reassociated {
            was_unread: status == EntryStatus::Unread,
        });
    }

    let now = now_micros();
    sqlx::query(
        r#"
        INSERT INTO entries
            (source_id, source_name, title, link, author, published_at, content,
             content_hash, guid, status, fetched_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'unread', ?, ?, ?)
    "#,
    )
    .bind(source.id)
    .bind(&source.name)
    .bind(&item.title)
    .bind(&item.link)
    .bind(&item.author)
    .bind(item.published_at)
    .bind(&item.content)
    .bind(&hash)
    .bind(&item.guid)
    .bind(now)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(Resolution::Inserted)
}

/// Ingest every active source, up to 10 concurrently.
///
/// Per-source failures are contained: one bad feed never blocks the rest.
/// Results are returned in completion order.
pub async fn ingest_all(db: &Database, client: &reqwest::Client) -> Vec<IngestOutcome> {
    let sources = match db.list_sources(true).await {
        Ok(sources) => sources,
        Err(e) => {
            tracing::error!(error = %e, "Could not list sources for ingestion");
            return Vec::new();
        }
    };

    stream::iter(sources)
        .map(|source| {
            let db = db.clone();
            let client = client.clone();
            async move {
                let result = ingest_source(&db, &client, &source).await;
                IngestOutcome {
                    source_id: source.id,
                    result,
                }
            }
        })
        .buffer_unordered(MAX_CONCURRENT_FETCHES)
        .collect()
        .await
}
