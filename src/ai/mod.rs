//! AI summarization boundary.
//!
//! Talks to any OpenAI-compatible chat completions endpoint and never lets a
//! failure escape: analysis is best-effort decoration, so every error path
//! degrades to a placeholder built from the entry's own content.
//!
//! Models are told to answer in JSON but frequently wrap it in markdown
//! fences, prose, or nested objects; `parse_analysis` tolerates all of that.

use std::time::Duration;

use serde_json::{json, Value};

use crate::config::AiConfig;
use crate::util::strip_html;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// How much entry content goes into the prompt.
const MAX_PROMPT_CONTENT: usize = 4_000;

const SYSTEM_PROMPT: &str = "You are a reading assistant. Given a feed item, reply with a JSON \
object with exactly two keys: \"content_type\" (one of: paper, blog, news, tutorial, social, \
other) and \"summary\" (a concise summary in the language of the item). Reply with JSON only.";

/// Classification plus summary for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    pub content_type: String,
    pub summary: String,
}

pub struct Summarizer {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_summary_len: usize,
}

impl Summarizer {
    pub fn new(config: &AiConfig, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            max_summary_len: config.max_summary_len,
        }
    }

    /// Analyze one entry. Infallible: any failure yields a placeholder
    /// analysis derived from the content itself.
    pub async fn classify_and_summarize(
        &self,
        title: &str,
        source_name: &str,
        content: Option<&str>,
    ) -> Analysis {
        let plain = content.map(strip_html).unwrap_or_default();

        if self.api_key.is_none() {
            tracing::debug!("No AI API key configured, using placeholder analysis");
            return self.placeholder(&plain);
        }

        match self.request(title, source_name, &plain).await {
            Ok(raw) => parse_analysis(&raw).unwrap_or_else(|| {
                tracing::warn!(response = %truncate_chars(&raw, 200), "Unparseable AI response");
                self.placeholder(&plain)
            }),
            Err(e) => {
                tracing::warn!(error = %e, title = %title, "AI request failed");
                self.placeholder(&plain)
            }
        }
    }

    async fn request(
        &self,
        title: &str,
        source_name: &str,
        plain: &str,
    ) -> Result<String, anyhow::Error> {
        let user = format!(
            "Title: {title}\nSource: {source_name}\nContent:\n{}",
            truncate_chars(plain, MAX_PROMPT_CONTENT)
        );
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user},
            ],
            "temperature": 0.3,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.as_deref().unwrap_or_default())
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let value: Value = response.json().await?;
        value["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("response missing choices[0].message.content"))
    }

    fn placeholder(&self, plain: &str) -> Analysis {
        let mut summary = truncate_chars(plain.trim(), self.max_summary_len);
        if summary.len() < plain.trim().len() {
            summary.push_str("...");
        }
        Analysis {
            content_type: "other".to_string(),
            summary,
        }
    }
}

/// Pull an [`Analysis`] out of whatever the model actually sent back.
pub fn parse_analysis(raw: &str) -> Option<Analysis> {
    let value = tolerant_json(raw)?;
    let obj = value.as_object()?;

    let summary = match obj.get("summary") {
        Some(Value::String(s)) => s.trim().to_string(),
        // Some models return a structured summary object; flatten it.
        Some(Value::Object(parts)) => flatten_summary(parts),
        _ => return None,
    };
    if summary.is_empty() {
        return None;
    }

    let content_type = obj
        .get("content_type")
        .and_then(Value::as_str)
        .map(normalize_content_type)
        .unwrap_or_else(|| "other".to_string());

    Some(Analysis {
        content_type,
        summary,
    })
}

/// Parse model output as JSON, shedding markdown fences and surrounding
/// prose as needed.
fn tolerant_json(raw: &str) -> Option<Value> {
    let mut text = raw.trim();
    if let Some(stripped) = text.strip_prefix("```json").or_else(|| text.strip_prefix("```")) {
        text = stripped.strip_suffix("```").unwrap_or(stripped).trim();
    }

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }

    // Last resort: the outermost brace pair, for JSON embedded in prose.
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Join a structured summary's known sections into readable prose.
fn flatten_summary(parts: &serde_json::Map<String, Value>) -> String {
    const SECTIONS: [(&str, &str); 5] = [
        ("research_problem", "Problem"),
        ("method", "Method"),
        ("findings", "Findings"),
        ("contribution", "Contribution"),
        ("keywords", "Keywords"),
    ];

    let mut lines = Vec::new();
    for (key, label) in SECTIONS {
        match parts.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => {
                lines.push(format!("{label}: {}", s.trim()));
            }
            Some(Value::Array(items)) => {
                let joined = items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                if !joined.is_empty() {
                    lines.push(format!("{label}: {joined}"));
                }
            }
            _ => {}
        }
    }

    if lines.is_empty() {
        // Unknown shape, take any string values in declaration order.
        for value in parts.values() {
            if let Some(s) = value.as_str() {
                if !s.trim().is_empty() {
                    lines.push(s.trim().to_string());
                }
            }
        }
    }
    lines.join("\n")
}

/// Collapse free-form model labels onto the fixed content-type vocabulary.
fn normalize_content_type(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    for known in ["paper", "blog", "news", "tutorial", "social"] {
        if lower.contains(known) {
            return known.to_string();
        }
    }
    if lower.contains("research") || lower.contains("academic") || lower.contains("article") {
        return "paper".to_string();
    }
    if lower.contains("guide") || lower.contains("howto") {
        return "tutorial".to_string();
    }
    "other".to_string()
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_clean_json() {
        let analysis =
            parse_analysis(r#"{"content_type": "blog", "summary": "A post about things."}"#)
                .unwrap();
        assert_eq!(analysis.content_type, "blog");
        assert_eq!(analysis.summary, "A post about things.");
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"content_type\": \"news\", \"summary\": \"Breaking.\"}\n```";
        let analysis = parse_analysis(raw).unwrap();
        assert_eq!(analysis.content_type, "news");
        assert_eq!(analysis.summary, "Breaking.");
    }

    #[test]
    fn test_parse_json_embedded_in_prose() {
        let raw = r#"Sure! Here is the analysis:
{"content_type": "tutorial", "summary": "Step by step."}
Hope that helps!"#;
        let analysis = parse_analysis(raw).unwrap();
        assert_eq!(analysis.content_type, "tutorial");
    }

    #[test]
    fn test_parse_structured_summary_is_flattened() {
        let raw = r#"{
            "content_type": "paper",
            "summary": {
                "research_problem": "Scaling laws",
                "method": "Train many models",
                "findings": "Loss follows a power law",
                "keywords": ["scaling", "llm"]
            }
        }"#;
        let analysis = parse_analysis(raw).unwrap();
        assert_eq!(analysis.content_type, "paper");
        assert_eq!(
            analysis.summary,
            "Problem: Scaling laws\nMethod: Train many models\nFindings: Loss follows a power law\nKeywords: scaling, llm"
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_analysis("I could not process this item."), None);
        assert_eq!(parse_analysis(r#"{"summary": ""}"#), None);
        assert_eq!(parse_analysis(r#"{"content_type": "blog"}"#), None);
    }

    #[test]
    fn test_normalize_content_type() {
        assert_eq!(normalize_content_type("Blog post"), "blog");
        assert_eq!(normalize_content_type("Research Paper"), "paper");
        assert_eq!(normalize_content_type("academic article"), "paper");
        assert_eq!(normalize_content_type("how-to guide"), "tutorial");
        assert_eq!(normalize_content_type("podcast"), "other");
    }

    #[tokio::test]
    async fn test_summarize_happy_path() {
        let mock_server = MockServer::start().await;
        let reply = serde_json::json!({
            "choices": [{"message": {"content":
                "{\"content_type\": \"blog\", \"summary\": \"Short take.\"}"}}]
        });
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply))
            .mount(&mock_server)
            .await;

        let config = AiConfig {
            base_url: format!("{}/v1", mock_server.uri()),
            ..Default::default()
        };
        let summarizer = Summarizer::new(&config, Some("test-key".to_string()));
        let analysis = summarizer
            .classify_and_summarize("T", "S", Some("<p>body</p>"))
            .await;
        assert_eq!(analysis.content_type, "blog");
        assert_eq!(analysis.summary, "Short take.");
    }

    #[tokio::test]
    async fn test_summarize_falls_back_on_server_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let config = AiConfig {
            base_url: format!("{}/v1", mock_server.uri()),
            max_summary_len: 10,
            ..Default::default()
        };
        let summarizer = Summarizer::new(&config, Some("test-key".to_string()));
        let analysis = summarizer
            .classify_and_summarize("T", "S", Some("<p>a long body of text here</p>"))
            .await;
        assert_eq!(analysis.content_type, "other");
        assert_eq!(analysis.summary, "a long bod...");
    }

    #[tokio::test]
    async fn test_no_api_key_skips_network() {
        let summarizer = Summarizer::new(&AiConfig::default(), None);
        let analysis = summarizer.classify_and_summarize("T", "S", Some("hi")).await;
        assert_eq!(analysis.content_type, "other");
        assert_eq!(analysis.summary, "hi");
    }
}
