//! Shared utilities: content fingerprinting and text normalization.

mod hash;
mod text;

pub use hash::{fingerprint, share_code, url_fingerprint};
pub use text::{join_authors, split_author_field, strip_html};

/// Maximum length of the denormalized author string on an entry.
pub const MAX_AUTHOR_LEN: usize = 200;
