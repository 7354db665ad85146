use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Storage-specific errors with user-facing messages.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A source with the same URL is already registered.
    #[error("A source with this URL already exists: {0}")]
    DuplicateUrl(String),

    /// The feed URL is not an absolute http(s) URL.
    #[error("Not a valid feed URL: {0}")]
    InvalidUrl(String),

    /// The requested row does not exist.
    #[error("Not found")]
    NotFound,

    /// Ran out of attempts generating a unique share code.
    #[error("Could not allocate a unique share code")]
    ShareCodeExhausted,

    /// Migration failed.
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error.
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

// ============================================================================
// Entry Lifecycle
// ============================================================================

/// Entry lifecycle status.
///
/// `UNREAD → {INTERESTED, FAVORITE, TRASH}`; INTERESTED/FAVORITE age into
/// ARCHIVED; any status can be restored to UNREAD by the user. Deletion is
/// row removal, never a status value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum EntryStatus {
    Unread,
    Interested,
    Favorite,
    Archived,
    Trash,
}

impl EntryStatus {
    /// Listing priority: interested first, trash last.
    pub fn priority(self) -> i64 {
        match self {
            EntryStatus::Interested => 1,
            EntryStatus::Unread => 2,
            EntryStatus::Favorite => 3,
            EntryStatus::Archived => 4,
            EntryStatus::Trash => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Unread => "unread",
            EntryStatus::Interested => "interested",
            EntryStatus::Favorite => "favorite",
            EntryStatus::Archived => "archived",
            EntryStatus::Trash => "trash",
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A registered feed source.
///
/// `entry_count`/`unread_count` are denormalized; every mutation site applies
/// matching deltas through the counter ledger in `sources.rs` rather than
/// recomputing by scan.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub url_hash: String,
    pub site_url: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub fetch_interval_minutes: Option<i64>,
    pub allow_ssl_bypass: bool,
    pub last_fetched_at: Option<i64>,
    pub last_fetch_status: String,
    pub last_fetch_error: Option<String>,
    pub fetch_count: i64,
    pub entry_count: i64,
    pub unread_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One ingested item.
///
/// `source_id` is nullable: an entry preserved through source deletion keeps
/// only the `source_name` snapshot for provenance. All timestamps are unix
/// microseconds.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Entry {
    pub id: i64,
    pub source_id: Option<i64>,
    pub source_name: String,
    pub title: String,
    pub link: String,
    pub author: Option<String>,
    pub published_at: Option<i64>,
    pub content: Option<String>,
    pub content_hash: String,
    pub guid: Option<String>,
    pub status: EntryStatus,
    pub is_read: bool,
    pub marked_at: Option<i64>,
    pub summary: Option<String>,
    pub content_type: Option<String>,
    pub analyzed_at: Option<i64>,
    pub notes: Option<String>,
    pub display_order: i64,
    pub exported: bool,
    pub export_key: Option<String>,
    pub fetched_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub expires_at: Option<i64>,
}

/// Input for registering a source.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub name: String,
    pub url: String,
    pub site_url: Option<String>,
    pub description: Option<String>,
    pub fetch_interval_minutes: Option<i64>,
    pub allow_ssl_bypass: bool,
}

impl NewSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            site_url: None,
            description: None,
            fetch_interval_minutes: None,
            allow_ssl_bypass: true,
        }
    }
}

/// Partial update for a source. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct SourcePatch {
    pub name: Option<String>,
    pub url: Option<String>,
    pub site_url: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub fetch_interval_minutes: Option<Option<i64>>,
    pub allow_ssl_bypass: Option<bool>,
}

/// Input for inserting an entry during ingestion.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub title: String,
    pub link: String,
    pub author: Option<String>,
    pub published_at: Option<i64>,
    pub content: Option<String>,
    pub content_hash: String,
    pub guid: Option<String>,
}

/// Result of reconciling a source deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Entries detached (source_id set to NULL) because the user kept them.
    pub preserved_entries: u64,
    /// Entries deleted outright.
    pub deleted_entries: u64,
}

/// Filter for listing entries. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub status: Option<EntryStatus>,
    pub source_id: Option<i64>,
    pub is_read: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A share record addressing a set of entries (or free text) by short code.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Share {
    pub id: i64,
    pub code: String,
    pub kind: String,
    pub entry_ids: Option<String>,
    pub body: Option<String>,
    pub title: Option<String>,
    pub created_at: i64,
    pub expires_at: Option<i64>,
}
