//! Configuration file parser for ~/.config/tidings/config.toml.
//!
//! The config file is optional — a missing file yields `Config::default()`.
//! Unknown keys are accepted and ignored, so configs survive upgrades in
//! both directions.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::sweeper::RetentionPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be
/// specified; missing keys fall back to `Default::default()`. Custom Debug
/// impls on the sub-sections mask API keys so they never reach logs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database path. None picks the default data location.
    pub database_path: Option<String>,

    /// Minutes between scheduled fetch runs.
    pub fetch_interval_minutes: u64,

    /// Local wall-clock hour of the daily retention sweep.
    pub cleanup_hour: u32,
    pub cleanup_minute: u32,

    pub retention: RetentionConfig,
    pub ai: AiConfig,
    pub zotero: ZoteroConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            fetch_interval_minutes: 30,
            cleanup_hour: 2,
            cleanup_minute: 0,
            retention: RetentionConfig::default(),
            ai: AiConfig::default(),
            zotero: ZoteroConfig::default(),
        }
    }
}

/// Retention windows, in days.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub unmarked_days: i64,
    pub trash_days: i64,
    pub archive_after_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            unmarked_days: 30,
            trash_days: 15,
            archive_after_days: 90,
        }
    }
}

/// Settings for the summarization backend (any OpenAI-compatible API).
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub base_url: String,
    pub model: String,
    /// Env var AI_API_KEY takes precedence over this.
    pub api_key: Option<String>,
    /// Target summary length in characters.
    pub max_summary_len: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            max_summary_len: 400,
        }
    }
}

impl std::fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("max_summary_len", &self.max_summary_len)
            .finish()
    }
}

/// Settings for the Zotero export boundary.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct ZoteroConfig {
    pub library_id: Option<String>,
    /// "user" or "group"; empty means "user".
    pub library_type: Option<String>,
    pub api_key: Option<String>,
    /// Optional collection key new items are filed under.
    pub collection: Option<String>,
}

impl std::fmt::Debug for ZoteroConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoteroConfig")
            .field("library_id", &self.library_id)
            .field("library_type", &self.library_type)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("collection", &self.collection)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            unmarked_days: self.retention.unmarked_days,
            trash_days: self.retention.trash_days,
            archive_after_days: self.retention.archive_after_days,
        }
    }

    /// The AI API key, env var first.
    pub fn ai_api_key(&self) -> Option<String> {
        std::env::var("AI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.ai.api_key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.fetch_interval_minutes, 30);
        assert_eq!(config.cleanup_hour, 2);
        assert_eq!(config.retention.unmarked_days, 30);
        assert_eq!(config.retention.trash_days, 15);
        assert_eq!(config.retention.archive_after_days, 90);
        assert!(config.ai.api_key.is_none());
        assert!(config.zotero.library_id.is_none());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/tidings_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.fetch_interval_minutes, 30);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let dir = std::env::temp_dir().join("tidings_config_test_partial");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "fetch_interval_minutes = 10\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.fetch_interval_minutes, 10);
        assert_eq!(config.cleanup_hour, 2); // default
        assert_eq!(config.retention.trash_days, 15); // default

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let dir = std::env::temp_dir().join("tidings_config_test_full");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let content = r#"
database_path = "/var/lib/tidings/tidings.db"
fetch_interval_minutes = 15
cleanup_hour = 3
cleanup_minute = 30

[retention]
unmarked_days = 7
trash_days = 3
archive_after_days = 180

[ai]
base_url = "http://localhost:11434/v1"
model = "llama3"
api_key = "sk-test"
max_summary_len = 200

[zotero]
library_id = "12345"
library_type = "group"
api_key = "zot-test"
collection = "ABCD1234"
"#;
        std::fs::write(&path, content).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.database_path.as_deref(),
            Some("/var/lib/tidings/tidings.db")
        );
        assert_eq!(config.fetch_interval_minutes, 15);
        assert_eq!(config.cleanup_hour, 3);
        assert_eq!(config.cleanup_minute, 30);
        assert_eq!(config.retention.unmarked_days, 7);
        assert_eq!(config.ai.model, "llama3");
        assert_eq!(config.ai.max_summary_len, 200);
        assert_eq!(config.zotero.library_id.as_deref(), Some("12345"));
        assert_eq!(config.zotero.library_type.as_deref(), Some("group"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let dir = std::env::temp_dir().join("tidings_config_test_invalid");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "this is not [valid toml").unwrap();

        let result = Config::load(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_debug_masks_api_keys() {
        let config = Config {
            ai: AiConfig {
                api_key: Some("super-secret-ai".to_string()),
                ..Default::default()
            },
            zotero: ZoteroConfig {
                api_key: Some("super-secret-zot".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("super-secret-ai"));
        assert!(!debug_output.contains("super-secret-zot"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_retention_policy_conversion() {
        let config = Config::default();
        let policy = config.retention_policy();
        assert_eq!(policy.unmarked_days, 30);
        assert_eq!(policy.trash_days, 15);
        assert_eq!(policy.archive_after_days, 90);
    }
}
