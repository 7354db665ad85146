use anyhow::Result;
use feed_rs::model::Person;
use feed_rs::parser;

use crate::util::{join_authors, split_author_field};

/// A parsed feed with the items worth ingesting.
#[derive(Debug, Clone)]
pub struct FeedDocument {
    pub title: Option<String>,
    pub items: Vec<ParsedItem>,
    /// Items dropped because they carried neither a link nor a title.
    pub skipped: usize,
}

/// One feed item, normalized for ingestion.
#[derive(Debug, Clone)]
pub struct ParsedItem {
    pub title: String,
    pub link: String,
    pub author: Option<String>,
    /// Publication time as unix microseconds; `updated` stands in when the
    /// feed omits `published`.
    pub published_at: Option<i64>,
    pub content: Option<String>,
    /// The item's id as feed-rs reports it: the source-native guid when the
    /// feed supplies one, otherwise a stable hash feed-rs synthesizes from
    /// the item. Either way it is deterministic across fetches.
    pub guid: Option<String>,
}

/// Parse raw feed bytes (RSS or Atom, feed-rs decides).
///
/// Lenient by construction: items missing individual fields are kept with
/// whatever they have; only items with neither link nor title are dropped,
/// since nothing could identify them.
pub fn parse_document(bytes: &[u8]) -> Result<FeedDocument> {
    let feed = parser::parse(bytes)?;
    let title = feed.title.map(|t| t.content);

    let mut items = Vec::with_capacity(feed.entries.len());
    let mut skipped = 0;

    for entry in feed.entries {
        let link = entry
            .links
            .first()
            .map(|l| l.href.clone())
            .unwrap_or_default();
        let item_title = entry.title.map(|t| t.content).unwrap_or_default();
        if link.is_empty() && item_title.is_empty() {
            skipped += 1;
            continue;
        }

        let published_at = entry
            .published
            .or(entry.updated)
            .map(|dt| dt.timestamp_micros());
        // Full content when present, summary as the fallback.
        let content = entry
            .content
            .and_then(|c| c.body)
            .or_else(|| entry.summary.map(|s| s.content));
        let guid = if entry.id.trim().is_empty() {
            None
        } else {
            Some(entry.id.trim().to_string())
        };

        items.push(ParsedItem {
            title: item_title,
            link,
            author: extract_authors(&entry.authors),
            published_at,
            content,
            guid,
        });
    }

    Ok(FeedDocument {
        title,
        items,
        skipped,
    })
}

/// Normalize an item's author list to one display string.
///
/// Multiple persons are joined as written. A single person whose name packs
/// several authors into one field ("A and B", "A; B") is split apart first,
/// so the output is uniformly comma-separated either way.
fn extract_authors(persons: &[Person]) -> Option<String> {
    let names: Vec<String> = persons
        .iter()
        .map(|p| p.name.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();

    let parts = match names.len() {
        0 => return None,
        1 => split_author_field(&names[0]),
        _ => names,
    };
    join_authors(&parts)
}
