use super::db::{now_micros, Database};
use super::types::{Share, StorageError};
use crate::util::share_code;

/// Share codes are 8 chars of mixed-case alphanumerics; collisions are
/// astronomically unlikely, but the insert retries a few times anyway.
const CODE_LEN: usize = 8;
const MAX_ATTEMPTS: usize = 5;

impl Database {
    /// Create a share addressing a set of entries, returning the record with
    /// its unguessable code.
    pub async fn create_share(
        &self,
        entry_ids: &[i64],
        title: Option<&str>,
        expires_at: Option<i64>,
    ) -> Result<Share, StorageError> {
        let ids_csv = entry_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");

        for _ in 0..MAX_ATTEMPTS {
            let code = share_code(CODE_LEN);
            let result = sqlx::query_as::<_, Share>(
                r#"
                INSERT INTO shares (code, kind, entry_ids, title, created_at, expires_at)
                VALUES (?, 'entries', ?, ?, ?, ?)
                RETURNING *
            "#,
            )
            .bind(&code)
            .bind(&ids_csv)
            .bind(title)
            .bind(now_micros())
            .bind(expires_at)
            .fetch_one(&self.pool)
            .await;

            match result {
                Ok(share) => return Ok(share),
                // UNIQUE collision on the code: roll a new one.
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StorageError::ShareCodeExhausted)
    }

    /// Look up a share by its code, ignoring expired ones.
    pub async fn get_share_by_code(&self, code: &str) -> Result<Option<Share>, StorageError> {
        let share = sqlx::query_as::<_, Share>(
            "SELECT * FROM shares WHERE code = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(code)
        .bind(now_micros())
        .fetch_optional(&self.pool)
        .await?;
        Ok(share)
    }

    /// The entry ids a share addresses, resolved back to rows that still
    /// exist. Deleted entries silently drop out.
    pub fn share_entry_ids(&self, share: &Share) -> Vec<i64> {
        share
            .entry_ids
            .as_deref()
            .unwrap_or("")
            .split(',')
            .filter_map(|s| s.parse().ok())
            .collect()
    }
}
