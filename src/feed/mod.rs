//! Feed retrieval and parsing.
//!
//! `fetcher` owns the HTTP side (timeouts, size caps, the certificate-bypass
//! retry); `parser` turns raw bytes into [`FeedDocument`] values via feed-rs.

pub mod fetcher;
pub mod parser;

pub use fetcher::{fetch, FetchError};
pub use parser::{parse_document, FeedDocument, ParsedItem};
