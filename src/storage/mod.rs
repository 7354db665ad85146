//! Persistence layer: SQLite via sqlx.
//!
//! One `Database` handle (a cloneable pool) with operations split by concern:
//!
//! - `db`: connection setup and migrations
//! - `sources`: source registry, the counter ledger, deletion reconciliation
//! - `entries`: entry lifecycle (status, read-marking, shuffle, listing)
//! - `shares`: unguessable share codes

mod db;
mod entries;
mod shares;
mod sources;
mod types;

pub use db::Database;
pub(crate) use db::now_micros;
pub(crate) use sources::apply_counter_delta;
pub use types::{
    Entry, EntryFilter, EntryStatus, NewEntry, NewSource, ReconcileReport, Share, Source,
    SourcePatch, StorageError,
};
