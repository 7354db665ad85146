//! Zotero export boundary.
//!
//! Pushes entries into a Zotero library over its web API. Export is a
//! convenience, never a dependency: failures are logged and reported as
//! `None`, and the caller decides whether to retry later.

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use crate::config::ZoteroConfig;
use crate::storage::Entry;
use crate::util::strip_html;

const API_BASE: &str = "https://api.zotero.org";
/// Zotero caps abstractNote display anyway; no point shipping whole articles.
const MAX_ABSTRACT_LEN: usize = 1_000;

/// Map an entry's AI content type onto a Zotero item type.
fn item_type_for(content_type: Option<&str>) -> &'static str {
    match content_type {
        Some("paper") => "journalArticle",
        Some("blog") => "blogPost",
        Some("news") => "newspaperArticle",
        _ => "webpage",
    }
}

pub struct ZoteroClient {
    client: reqwest::Client,
    items_url: String,
    api_key: String,
    collection: Option<String>,
}

impl ZoteroClient {
    /// Build a client from config. `None` when the config is incomplete,
    /// which callers treat as "export not set up".
    pub fn from_config(config: &ZoteroConfig) -> Option<Self> {
        let library_id = config.library_id.as_deref()?;
        let api_key = config.api_key.as_deref()?;
        let scope = match config.library_type.as_deref() {
            Some("group") => "groups",
            _ => "users",
        };
        Some(Self {
            client: reqwest::Client::new(),
            items_url: format!("{API_BASE}/{scope}/{library_id}/items"),
            api_key: api_key.to_string(),
            collection: config.collection.clone(),
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base: &str, library_id: &str) -> Self {
        self.items_url = format!("{base}/users/{library_id}/items");
        self
    }

    /// Create one Zotero item for an entry. Returns the new item key, or
    /// `None` on any failure.
    pub async fn create_item(&self, entry: &Entry) -> Option<String> {
        let payload = json!([self.build_item(entry)]);

        let result = self
            .client
            .post(&self.items_url)
            .header("Zotero-API-Key", &self.api_key)
            .header("Zotero-API-Version", "3")
            .json(&payload)
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(entry_id = entry.id, error = %e, "Zotero request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            tracing::warn!(
                entry_id = entry.id,
                status = %response.status(),
                "Zotero rejected the item"
            );
            return None;
        }

        let body: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(entry_id = entry.id, error = %e, "Unreadable Zotero response");
                return None;
            }
        };

        // The write API indexes results by position in the submitted array.
        let key = body["successful"]["0"]["key"]
            .as_str()
            .or_else(|| body["success"]["0"].as_str())
            .map(|k| k.to_string());
        if key.is_none() {
            tracing::warn!(entry_id = entry.id, "Zotero response carried no item key");
        }
        key
    }

    fn build_item(&self, entry: &Entry) -> Value {
        let creators: Vec<Value> = entry
            .author
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| json!({"creatorType": "author", "name": name}))
            .collect();

        let abstract_note = entry
            .content
            .as_deref()
            .map(strip_html)
            .map(|plain| plain.chars().take(MAX_ABSTRACT_LEN).collect::<String>())
            .unwrap_or_default();
        let date = entry
            .published_at
            .and_then(|micros| Utc.timestamp_micros(micros).single())
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        let extra = entry
            .summary
            .as_deref()
            .map(|s| format!("Summary: {s}"))
            .unwrap_or_default();

        let mut item = json!({
            "itemType": item_type_for(entry.content_type.as_deref()),
            "title": entry.title,
            "url": entry.link,
            "accessDate": Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            "date": date,
            "creators": creators,
            "abstractNote": abstract_note,
            "extra": extra,
            "tags": [{"tag": format!("source:{}", entry.source_name)}],
        });
        if let Some(collection) = &self.collection {
            item["collections"] = json!([collection]);
        }
        item
    }
}
