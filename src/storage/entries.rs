use rand::seq::SliceRandom;
use sqlx::QueryBuilder;

use super::db::{now_micros, Database};
use super::sources::apply_counter_delta;
use super::types::{Entry, EntryFilter, EntryStatus, NewEntry, StorageError};

/// SQL fragment for the canonical listing order: status priority, then
/// manual display order, then fetch recency.
const LISTING_ORDER: &str = "ORDER BY CASE status
        WHEN 'interested' THEN 1
        WHEN 'unread' THEN 2
        WHEN 'favorite' THEN 3
        WHEN 'archived' THEN 4
        WHEN 'trash' THEN 5
        ELSE 99 END,
    display_order DESC, fetched_at DESC";

impl Database {
    // ========================================================================
    // Entry CRUD
    // ========================================================================

    /// Insert a new UNREAD entry attributed to a source, adjusting the
    /// source's counters in the same transaction.
    pub async fn insert_entry(
        &self,
        source_id: i64,
        source_name: &str,
        new: &NewEntry,
    ) -> Result<i64, StorageError> {
        let now = now_micros();
        let mut tx = self.pool.begin().await?;

        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO entries
                (source_id, source_name, title, link, author, published_at, content,
                 content_hash, guid, status, fetched_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'unread', ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(source_id)
        .bind(source_name)
        .bind(&new.title)
        .bind(&new.link)
        .bind(&new.author)
        .bind(new.published_at)
        .bind(&new.content)
        .bind(&new.content_hash)
        .bind(&new.guid)
        .bind(now)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        apply_counter_delta(&mut tx, source_id, 1, 1).await?;
        tx.commit().await?;
        Ok(row.0)
    }

    pub async fn get_entry(&self, id: i64) -> Result<Option<Entry>, StorageError> {
        let entry = sqlx::query_as::<_, Entry>("SELECT * FROM entries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(entry)
    }

    /// List entries in the canonical inbox order.
    pub async fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<Entry>, StorageError> {
        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("SELECT * FROM entries WHERE 1 = 1");

        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(source_id) = filter.source_id {
            builder.push(" AND source_id = ").push_bind(source_id);
        }
        if let Some(is_read) = filter.is_read {
            builder.push(" AND is_read = ").push_bind(is_read);
        }
        builder.push(" ").push(LISTING_ORDER);
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(limit);
            if let Some(offset) = filter.offset {
                builder.push(" OFFSET ").push_bind(offset);
            }
        }

        let entries = builder
            .build_query_as::<Entry>()
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }

    /// Keyword search over title, content, and AI summary.
    ///
    /// Plain LIKE matching; relevance ranking is out of scope.
    pub async fn search_entries(&self, query: &str, limit: i64) -> Result<Vec<Entry>, StorageError> {
        let pattern = format!("%{}%", query);
        let sql = format!(
            "SELECT * FROM entries
             WHERE title LIKE ? OR content LIKE ? OR summary LIKE ?
             {LISTING_ORDER} LIMIT ?"
        );
        let entries = sqlx::query_as::<_, Entry>(&sql)
            .bind(&pattern)
            .bind(&pattern)
            .bind(&pattern)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }

    // ========================================================================
    // Lifecycle State Machine
    // ========================================================================

    /// Transition an entry to a new status.
    ///
    /// Stamps `marked_at`; any status other than UNREAD forces `is_read`
    /// (an item cannot be both read-pending and actioned). Restoring to
    /// UNREAD never clears `is_read` — read tracking is independent once
    /// set. The owning source's unread counter moves with UNREAD↔other
    /// transitions, in the same transaction.
    pub async fn set_status(&self, id: i64, status: EntryStatus) -> Result<Entry, StorageError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(EntryStatus, Option<i64>)> =
            sqlx::query_as("SELECT status, source_id FROM entries WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let (old_status, source_id) = current.ok_or(StorageError::NotFound)?;

        let now = now_micros();
        if status != EntryStatus::Unread {
            sqlx::query(
                "UPDATE entries SET status = ?, marked_at = ?, is_read = 1, updated_at = ? WHERE id = ?",
            )
        } else {
            sqlx::query(
                "UPDATE entries SET status = ?, marked_at = ?, updated_at = ? WHERE id = ?",
            )
        }
        .bind(status.as_str())
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if let Some(source_id) = source_id {
            let unread_delta = match (old_status, status) {
                (EntryStatus::Unread, s) if s != EntryStatus::Unread => -1,
                (s, EntryStatus::Unread) if s != EntryStatus::Unread => 1,
                _ => 0,
            };
            apply_counter_delta(&mut tx, source_id, 0, unread_delta).await?;
        }

        tx.commit().await?;
        self.get_entry(id).await?.ok_or(StorageError::NotFound)
    }

    /// Transition a batch of entries, computing one aggregate counter delta
    /// per source over the whole batch.
    pub async fn batch_set_status(
        &self,
        ids: &[i64],
        status: EntryStatus,
    ) -> Result<u64, StorageError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;

        // Per-source counts of entries whose UNREAD-ness will flip.
        let mut count_builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
            "SELECT source_id, COUNT(*) FROM entries WHERE source_id IS NOT NULL AND status ",
        );
        if status == EntryStatus::Unread {
            count_builder.push("!= 'unread'");
        } else {
            count_builder.push("= 'unread'");
        }
        count_builder.push(" AND id IN (");
        let mut separated = count_builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") GROUP BY source_id");
        let flips: Vec<(i64, i64)> = count_builder
            .build_query_as()
            .fetch_all(&mut *tx)
            .await?;

        let now = now_micros();
        let mut update_builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("UPDATE entries SET status = ");
        update_builder.push_bind(status.as_str());
        update_builder.push(", marked_at = ").push_bind(now);
        update_builder.push(", updated_at = ").push_bind(now);
        if status != EntryStatus::Unread {
            update_builder.push(", is_read = 1");
        }
        update_builder.push(" WHERE id IN (");
        let mut separated = update_builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
        let affected = update_builder
            .build()
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let sign = if status == EntryStatus::Unread { 1 } else { -1 };
        for (source_id, count) in flips {
            apply_counter_delta(&mut tx, source_id, 0, sign * count).await?;
        }

        tx.commit().await?;
        Ok(affected)
    }

    /// Mark an entry read. Idempotent: a second call is a no-op.
    ///
    /// Flipping read-state on a live-source entry still in UNREAD status
    /// moves that source's unread counter by exactly -1 in the same unit of
    /// work.
    pub async fn mark_read(&self, id: i64) -> Result<Entry, StorageError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(bool, EntryStatus, Option<i64>)> =
            sqlx::query_as("SELECT is_read, status, source_id FROM entries WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let (is_read, status, source_id) = current.ok_or(StorageError::NotFound)?;

        if !is_read {
            sqlx::query("UPDATE entries SET is_read = 1, updated_at = ? WHERE id = ?")
                .bind(now_micros())
                .bind(id)
                .execute(&mut *tx)
                .await?;
            if let Some(source_id) = source_id {
                if status == EntryStatus::Unread {
                    apply_counter_delta(&mut tx, source_id, 0, -1).await?;
                }
            }
        }

        tx.commit().await?;
        self.get_entry(id).await?.ok_or(StorageError::NotFound)
    }

    /// Mark a batch of entries read, with one aggregate delta per source.
    pub async fn batch_mark_read(&self, ids: &[i64]) -> Result<u64, StorageError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;

        let mut count_builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
            "SELECT source_id, COUNT(*) FROM entries
             WHERE source_id IS NOT NULL AND is_read = 0 AND status = 'unread' AND id IN (",
        );
        let mut separated = count_builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") GROUP BY source_id");
        let flips: Vec<(i64, i64)> = count_builder
            .build_query_as()
            .fetch_all(&mut *tx)
            .await?;

        let mut update_builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("UPDATE entries SET is_read = 1, updated_at = ");
        update_builder.push_bind(now_micros());
        update_builder.push(" WHERE is_read = 0 AND id IN (");
        let mut separated = update_builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
        let affected = update_builder
            .build()
            .execute(&mut *tx)
            .await?
            .rows_affected();

        for (source_id, count) in flips {
            apply_counter_delta(&mut tx, source_id, 0, -count).await?;
        }

        tx.commit().await?;
        Ok(affected)
    }

    /// Re-randomize the display order of all UNREAD entries.
    ///
    /// Breaks chronological ordering for a non-curated reading experience.
    /// Returns the number of entries shuffled.
    pub async fn shuffle_unread(&self) -> Result<usize, StorageError> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT id FROM entries WHERE status = 'unread'")
            .fetch_all(&self.pool)
            .await?;
        let mut ids: Vec<i64> = rows.into_iter().map(|(id,)| id).collect();
        if ids.is_empty() {
            return Ok(0);
        }

        ids.shuffle(&mut rand::thread_rng());

        let total = ids.len();
        let mut tx = self.pool.begin().await?;
        for (position, id) in ids.iter().enumerate() {
            // First in the shuffled order gets the largest display_order.
            sqlx::query("UPDATE entries SET display_order = ? WHERE id = ?")
                .bind((total - position) as i64)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(total)
    }

    // ========================================================================
    // Bookkeeping
    // ========================================================================

    /// Replace the user's free-text notes on an entry.
    pub async fn update_notes(&self, id: i64, notes: Option<&str>) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE entries SET notes = ?, updated_at = ? WHERE id = ?")
            .bind(notes)
            .bind(now_micros())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    /// Record an AI analysis result on an entry.
    pub async fn set_analysis(
        &self,
        id: i64,
        content_type: &str,
        summary: &str,
    ) -> Result<(), StorageError> {
        let now = now_micros();
        sqlx::query(
            "UPDATE entries SET content_type = ?, summary = ?, analyzed_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(content_type)
        .bind(summary)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a successful export to the reference manager.
    pub async fn mark_exported(&self, id: i64, item_key: &str) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE entries SET exported = 1, export_key = ?, updated_at = ? WHERE id = ?",
        )
        .bind(item_key)
        .bind(now_micros())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
