//! tidings — a feed aggregation engine with a stateful, deduplicated inbox.
//!
//! The core is the ingestion pipeline: fetch a feed, deduplicate its items
//! against prior history by content fingerprint, reattach orphaned kept
//! entries, and advance stored entries through a status lifecycle that
//! governs retention, archival, and deletion.

pub mod ai;
pub mod config;
pub mod export;
pub mod feed;
pub mod ingest;
pub mod scheduler;
pub mod storage;
pub mod sweeper;
pub mod util;
