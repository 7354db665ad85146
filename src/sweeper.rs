//! Retention sweeper: ages out entries nobody acted on.
//!
//! Three passes, each its own transaction, all judged against one timestamp
//! taken when the sweep starts:
//!
//! 1. UNREAD entries older than the unmarked window are deleted
//! 2. TRASH entries older than the trash window are deleted
//! 3. INTERESTED/FAVORITE entries older than the archive window become
//!    ARCHIVED
//!
//! Cutoffs are strict: an entry stamped exactly at the cutoff survives this
//! sweep and falls to the next one.

use crate::storage::{apply_counter_delta, now_micros, Database, StorageError};

const MICROS_PER_DAY: i64 = 86_400 * 1_000_000;

/// Age thresholds, in days.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// UNREAD entries the user never touched.
    pub unmarked_days: i64,
    /// TRASH entries, counted from when they were trashed.
    pub trash_days: i64,
    /// INTERESTED/FAVORITE entries, counted from when they were marked.
    pub archive_after_days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            unmarked_days: 30,
            trash_days: 15,
            archive_after_days: 90,
        }
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted_unread: u64,
    pub deleted_trash: u64,
    pub archived: u64,
}

/// Run all three retention passes.
pub async fn sweep(db: &Database, policy: &RetentionPolicy) -> Result<SweepReport, StorageError> {
    let report = sweep_at(db, policy, now_micros()).await?;
    tracing::info!(
        deleted_unread = report.deleted_unread,
        deleted_trash = report.deleted_trash,
        archived = report.archived,
        "Retention sweep complete"
    );
    Ok(report)
}

async fn sweep_at(
    db: &Database,
    policy: &RetentionPolicy,
    now: i64,
) -> Result<SweepReport, StorageError> {
    let deleted_unread =
        delete_stale_unread(db, now - policy.unmarked_days * MICROS_PER_DAY).await?;
    let deleted_trash = delete_stale_trash(db, now - policy.trash_days * MICROS_PER_DAY).await?;
    let archived =
        archive_stale_marks(db, now - policy.archive_after_days * MICROS_PER_DAY).await?;
    Ok(SweepReport {
        deleted_unread,
        deleted_trash,
        archived,
    })
}

/// Delete UNREAD entries fetched before the cutoff.
///
/// Counter corrections mirror the live deltas: every deleted live-source row
/// leaves entry_count, but only the still-unread ones (is_read = 0) leave
/// unread_count, since read-marking already decremented the rest.
async fn delete_stale_unread(db: &Database, cutoff: i64) -> Result<u64, StorageError> {
    let mut tx = db.pool.begin().await?;

    let corrections: Vec<(i64, i64, i64)> = sqlx::query_as(
        r#"
        SELECT source_id, COUNT(*), SUM(CASE WHEN is_read = 0 THEN 1 ELSE 0 END)
        FROM entries
        WHERE status = 'unread' AND fetched_at < ? AND source_id IS NOT NULL
        GROUP BY source_id
    "#,
    )
    .bind(cutoff)
    .fetch_all(&mut *tx)
    .await?;

    let deleted = sqlx::query("DELETE FROM entries WHERE status = 'unread' AND fetched_at < ?")
        .bind(cutoff)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    for (source_id, total, unread) in corrections {
        apply_counter_delta(&mut tx, source_id, -total, -unread).await?;
    }

    tx.commit().await?;
    Ok(deleted)
}

/// Delete TRASH entries trashed before the cutoff.
///
/// Trashed entries left unread_count when they entered TRASH, so only
/// entry_count moves here.
async fn delete_stale_trash(db: &Database, cutoff: i64) -> Result<u64, StorageError> {
    let mut tx = db.pool.begin().await?;

    let corrections: Vec<(i64, i64)> = sqlx::query_as(
        r#"
        SELECT source_id, COUNT(*)
        FROM entries
        WHERE status = 'trash' AND marked_at IS NOT NULL AND marked_at < ?
              AND source_id IS NOT NULL
        GROUP BY source_id
    "#,
    )
    .bind(cutoff)
    .fetch_all(&mut *tx)
    .await?;

    let deleted = sqlx::query(
        "DELETE FROM entries WHERE status = 'trash' AND marked_at IS NOT NULL AND marked_at < ?",
    )
    .bind(cutoff)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    for (source_id, total) in corrections {
        apply_counter_delta(&mut tx, source_id, -total, 0).await?;
    }

    tx.commit().await?;
    Ok(deleted)
}

/// Age INTERESTED/FAVORITE marks into ARCHIVED.
///
/// The original mark time stays put; archived entries are never swept, they
/// are the long-term record.
async fn archive_stale_marks(db: &Database, cutoff: i64) -> Result<u64, StorageError> {
    let archived = sqlx::query(
        r#"
        UPDATE entries SET status = 'archived', updated_at = ?
        WHERE status IN ('interested', 'favorite')
              AND marked_at IS NOT NULL AND marked_at < ?
    "#,
    )
    .bind(now_micros())
    .bind(cutoff)
    .execute(&db.pool)
    .await?
    .rows_affected();
    Ok(archived)
}
