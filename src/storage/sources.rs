use sqlx::SqliteConnection;

use super::db::{now_micros, Database};
use super::types::{NewSource, ReconcileReport, Source, SourcePatch, StorageError};
use crate::util::url_fingerprint;

// ============================================================================
// Counter Ledger
// ============================================================================

/// Apply a counter delta to one source, in the caller's transaction.
///
/// This is the single mutation point for `entry_count`/`unread_count`; call
/// sites express intent ("+1 entry", "-1 unread") instead of hand-rolled
/// arithmetic. Counters are clamped at zero. Entries with no owning source
/// never reach this function.
pub(crate) async fn apply_counter_delta(
    conn: &mut SqliteConnection,
    source_id: i64,
    entry_delta: i64,
    unread_delta: i64,
) -> Result<(), sqlx::Error> {
    if entry_delta == 0 && unread_delta == 0 {
        return Ok(());
    }
    sqlx::query(
        "UPDATE sources SET
             entry_count = MAX(0, entry_count + ?),
             unread_count = MAX(0, unread_count + ?)
         WHERE id = ?",
    )
    .bind(entry_delta)
    .bind(unread_delta)
    .bind(source_id)
    .execute(conn)
    .await?;
    Ok(())
}

fn validate_feed_url(raw: &str) -> Result<(), StorageError> {
    match url::Url::parse(raw) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(StorageError::InvalidUrl(raw.to_string())),
    }
}

impl Database {
    // ========================================================================
    // Source Registry
    // ========================================================================

    /// Register a new source. Rejects invalid and duplicate URLs before any
    /// write.
    pub async fn create_source(&self, new: &NewSource) -> Result<Source, StorageError> {
        validate_feed_url(&new.url)?;
        let url_hash = url_fingerprint(&new.url);
        if self.get_source_by_url_hash(&url_hash).await?.is_some() {
            return Err(StorageError::DuplicateUrl(new.url.clone()));
        }

        let now = now_micros();
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO sources
                (name, url, url_hash, site_url, description, fetch_interval_minutes,
                 allow_ssl_bypass, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(&new.name)
        .bind(&new.url)
        .bind(&url_hash)
        .bind(&new.site_url)
        .bind(&new.description)
        .bind(new.fetch_interval_minutes)
        .bind(new.allow_ssl_bypass)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(source_id = row.0, name = %new.name, url = %new.url, "Registered source");
        self.get_source(row.0).await?.ok_or(StorageError::NotFound)
    }

    pub async fn get_source(&self, id: i64) -> Result<Option<Source>, StorageError> {
        let source = sqlx::query_as::<_, Source>("SELECT * FROM sources WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(source)
    }

    pub async fn get_source_by_url_hash(&self, hash: &str) -> Result<Option<Source>, StorageError> {
        let source = sqlx::query_as::<_, Source>("SELECT * FROM sources WHERE url_hash = ?")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(source)
    }

    /// List sources, optionally restricted to active ones.
    pub async fn list_sources(&self, active_only: bool) -> Result<Vec<Source>, StorageError> {
        let query = if active_only {
            "SELECT * FROM sources WHERE is_active = 1 ORDER BY created_at DESC"
        } else {
            "SELECT * FROM sources ORDER BY created_at DESC"
        };
        let sources = sqlx::query_as::<_, Source>(query)
            .fetch_all(&self.pool)
            .await?;
        Ok(sources)
    }

    /// Apply a partial update to a source.
    ///
    /// A URL change recomputes the fingerprint with a duplicate check; a name
    /// change propagates the new snapshot to all attached entries so
    /// provenance stays current.
    pub async fn update_source(&self, id: i64, patch: &SourcePatch) -> Result<Source, StorageError> {
        let current = self.get_source(id).await?.ok_or(StorageError::NotFound)?;

        let mut url = current.url.clone();
        let mut url_hash = current.url_hash.clone();
        if let Some(new_url) = &patch.url {
            validate_feed_url(new_url)?;
            let new_hash = url_fingerprint(new_url);
            if let Some(existing) = self.get_source_by_url_hash(&new_hash).await? {
                if existing.id != id {
                    return Err(StorageError::DuplicateUrl(new_url.clone()));
                }
            }
            url = new_url.clone();
            url_hash = new_hash;
        }

        let name = patch.name.clone().unwrap_or_else(|| current.name.clone());
        let site_url = match &patch.site_url {
            Some(v) => v.clone(),
            None => current.site_url.clone(),
        };
        let description = match &patch.description {
            Some(v) => v.clone(),
            None => current.description.clone(),
        };
        let is_active = patch.is_active.unwrap_or(current.is_active);
        let fetch_interval = match patch.fetch_interval_minutes {
            Some(v) => v,
            None => current.fetch_interval_minutes,
        };
        let allow_ssl_bypass = patch.allow_ssl_bypass.unwrap_or(current.allow_ssl_bypass);

        let mut tx = self.pool.begin().await?;

        if name != current.name {
            sqlx::query("UPDATE entries SET source_name = ? WHERE source_id = ?")
                .bind(&name)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            tracing::info!(
                source_id = id,
                old = %current.name,
                new = %name,
                "Propagated source rename to entries"
            );
        }

        sqlx::query(
            r#"
            UPDATE sources SET
                name = ?, url = ?, url_hash = ?, site_url = ?, description = ?,
                is_active = ?, fetch_interval_minutes = ?, allow_ssl_bypass = ?,
                updated_at = ?
            WHERE id = ?
        "#,
        )
        .bind(&name)
        .bind(&url)
        .bind(&url_hash)
        .bind(&site_url)
        .bind(&description)
        .bind(is_active)
        .bind(fetch_interval)
        .bind(allow_ssl_bypass)
        .bind(now_micros())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.get_source(id).await?.ok_or(StorageError::NotFound)
    }

    // ========================================================================
    // Deletion Reconciler
    // ========================================================================

    /// Remove a source, splitting its entries into preserved and discarded.
    ///
    /// INTERESTED and FAVORITE entries are user-curated: they are detached
    /// (source_id set to NULL) with the name snapshot stamped so provenance
    /// survives. Everything else attributed to the source is deleted, then
    /// the source row itself. The detached rows are the orphans that a later
    /// fetch of the same URL can reassociate.
    pub async fn delete_source(&self, id: i64) -> Result<ReconcileReport, StorageError> {
        let source = self.get_source(id).await?.ok_or(StorageError::NotFound)?;

        let mut tx = self.pool.begin().await?;

        let preserved = sqlx::query(
            r#"
            UPDATE entries SET source_id = NULL, source_name = ?
            WHERE source_id = ? AND status IN ('interested', 'favorite')
        "#,
        )
        .bind(&source.name)
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let deleted = sqlx::query("DELETE FROM entries WHERE source_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM sources WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(
            source_id = id,
            name = %source.name,
            preserved = preserved,
            deleted = deleted,
            "Deleted source"
        );
        Ok(ReconcileReport {
            preserved_entries: preserved,
            deleted_entries: deleted,
        })
    }

    // ========================================================================
    // Fetch Status
    // ========================================================================

    /// Mark a fetch attempt as failed on the source.
    ///
    /// Transient fetch errors never escape the ingestion boundary; they land
    /// here and the next scheduled fetch retries naturally.
    pub async fn record_fetch_failure(&self, id: i64, error: &str) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE sources SET last_fetch_status = 'failed', last_fetch_error = ?,
             last_fetched_at = ? WHERE id = ?",
        )
        .bind(error)
        .bind(now_micros())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Recount a source's entries directly (diagnostic; not a hot path).
    ///
    /// Returns (entry_count, unread_count) as actually stored, for checking
    /// the denormalized counters against ground truth.
    pub async fn recount_source(&self, id: i64) -> Result<(i64, i64), StorageError> {
        let entries: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entries WHERE source_id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        let unread: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM entries WHERE source_id = ? AND status = 'unread'",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok((entries.0, unread.0))
    }
}
