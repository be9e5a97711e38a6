//! Configuration file parser for ~/.config/blogdeck/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged as likely typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::gesture::{GestureConfig, DEFAULT_COMMIT_THRESHOLD_PX, DEFAULT_TAP_SLOP_PX};
use crate::storage::{CachePolicy, DEFAULT_CAPACITY, DEFAULT_STORAGE_QUOTA_BYTES, DEFAULT_TTL_HOURS};

/// Overrides `cloud_api_key`.
pub const CLOUD_KEY_ENV: &str = "BLOGDECK_CLOUD_KEY";
/// Overrides `cloud_access_token`.
pub const CLOUD_TOKEN_ENV: &str = "BLOGDECK_CLOUD_TOKEN";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// Every field has a default, so any subset of keys can be specified.
/// Debug output masks the cloud credentials.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the article and summary service.
    pub api_base_url: String,

    /// Free-text reader interests forwarded to the summary service.
    pub interests: Option<String>,

    /// Horizontal drag distance a swipe must exceed to commit.
    pub swipe_threshold_px: f64,

    /// Movement below this is still a tap.
    pub tap_slop_px: f64,

    pub exit_animation_ms: u64,
    pub snap_back_ms: u64,

    /// Entries kept per cache after compaction.
    pub cache_capacity: usize,
    pub cache_ttl_hours: i64,

    /// Byte quota for the on-device key-value store.
    pub storage_quota_bytes: u64,

    /// REST root of the cloud store. Cloud sync is off when unset.
    pub cloud_url: Option<String>,

    /// Project key for the cloud store. `BLOGDECK_CLOUD_KEY` takes precedence.
    pub cloud_api_key: Option<String>,

    /// Signed-in user's access token. `BLOGDECK_CLOUD_TOKEN` takes precedence.
    pub cloud_access_token: Option<String>,

    /// Signed-in user's id. Without it the app runs anonymously.
    pub user_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000".to_string(),
            interests: None,
            swipe_threshold_px: DEFAULT_COMMIT_THRESHOLD_PX,
            tap_slop_px: DEFAULT_TAP_SLOP_PX,
            exit_animation_ms: 300,
            snap_back_ms: 200,
            cache_capacity: DEFAULT_CAPACITY,
            cache_ttl_hours: DEFAULT_TTL_HOURS,
            storage_quota_bytes: DEFAULT_STORAGE_QUOTA_BYTES,
            cloud_url: None,
            cloud_api_key: None,
            cloud_access_token: None,
            user_id: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_base_url", &self.api_base_url)
            .field("interests", &self.interests)
            .field("swipe_threshold_px", &self.swipe_threshold_px)
            .field("tap_slop_px", &self.tap_slop_px)
            .field("exit_animation_ms", &self.exit_animation_ms)
            .field("snap_back_ms", &self.snap_back_ms)
            .field("cache_capacity", &self.cache_capacity)
            .field("cache_ttl_hours", &self.cache_ttl_hours)
            .field("storage_quota_bytes", &self.storage_quota_bytes)
            .field("cloud_url", &self.cloud_url)
            .field(
                "cloud_api_key",
                &self.cloud_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "cloud_access_token",
                &self.cloud_access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Prefer a non-empty env value over the file value.
fn resolve_secret(env: Option<String>, file: Option<&String>) -> Option<SecretString> {
    env.filter(|v| !v.trim().is_empty())
        .or_else(|| file.filter(|v| !v.trim().is_empty()).cloned())
        .map(SecretString::from)
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 13] = [
        "api_base_url",
        "interests",
        "swipe_threshold_px",
        "tap_slop_px",
        "exit_animation_ms",
        "snap_back_ms",
        "cache_capacity",
        "cache_ttl_hours",
        "storage_quota_bytes",
        "cloud_url",
        "cloud_api_key",
        "cloud_access_token",
        "user_id",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing or empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
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

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(
            api_base_url = %config.api_base_url,
            cloud = config.cloud_url.is_some(),
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn gesture_config(&self) -> GestureConfig {
        GestureConfig {
            commit_threshold_px: self.swipe_threshold_px,
            tap_slop_px: self.tap_slop_px,
            exit_animation: Duration::from_millis(self.exit_animation_ms),
            snap_back: Duration::from_millis(self.snap_back_ms),
            ..GestureConfig::default()
        }
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            capacity: self.cache_capacity.max(1),
            ttl: chrono::Duration::hours(self.cache_ttl_hours.max(1)),
        }
    }

    pub fn cloud_api_key(&self) -> Option<SecretString> {
        resolve_secret(std::env::var(CLOUD_KEY_ENV).ok(), self.cloud_api_key.as_ref())
    }

    pub fn cloud_access_token(&self) -> Option<SecretString> {
        resolve_secret(
            std::env::var(CLOUD_TOKEN_ENV).ok(),
            self.cloud_access_token.as_ref(),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api_base_url, "http://localhost:3000");
        assert_eq!(config.swipe_threshold_px, 100.0);
        assert_eq!(config.tap_slop_px, 10.0);
        assert_eq!(config.exit_animation_ms, 300);
        assert_eq!(config.cache_capacity, 50);
        assert_eq!(config.cache_ttl_hours, 24);
        assert!(config.cloud_url.is_none());
        assert!(config.user_id.is_none());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/blogdeck_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.api_base_url, "http://localhost:3000");
    }

    #[test]
    fn test_whitespace_only_returns_default() {
        let config = Config::parse("   \n  \n  ").unwrap();
        assert_eq!(config.snap_back_ms, 200);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let config = Config::parse("swipe_threshold_px = 80.0\ninterests = \"rust, databases\"\n").unwrap();
        assert_eq!(config.swipe_threshold_px, 80.0);
        assert_eq!(config.interests.as_deref(), Some("rust, databases"));
        assert_eq!(config.tap_slop_px, 10.0);

        let gesture = config.gesture_config();
        assert_eq!(gesture.commit_threshold_px, 80.0);
        assert_eq!(gesture.exit_animation, Duration::from_millis(300));
    }

    #[test]
    fn test_full_config_from_file() {
        let dir = std::env::temp_dir().join("blogdeck_config_test_full");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        let content = r#"
api_base_url = "https://reader.example.com"
exit_animation_ms = 150
cache_capacity = 10
cache_ttl_hours = 2
storage_quota_bytes = 1024
cloud_url = "https://cloud.example.com/rest/v1"
cloud_api_key = "anon-123"
user_id = "u-1"
"#;
        std::fs::write(&path, content).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.api_base_url, "https://reader.example.com");
        assert_eq!(config.storage_quota_bytes, 1024);
        assert_eq!(config.user_id.as_deref(), Some("u-1"));
        let policy = config.cache_policy();
        assert_eq!(policy.capacity, 10);
        assert_eq!(policy.ttl, chrono::Duration::hours(2));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let err = Config::parse("this is not [valid toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let config = Config::parse("tap_slop_px = 12.0\ntotally_fake_key = 1\n").unwrap();
        assert_eq!(config.tap_slop_px, 12.0);
    }

    #[test]
    fn test_wrong_type_returns_error() {
        assert!(Config::parse("exit_animation_ms = \"fast\"\n").is_err());
    }

    #[test]
    fn test_too_large_file_rejected() {
        let dir = std::env::temp_dir().join("blogdeck_config_test_too_large");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "a".repeat(1_048_577)).unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_env_secret_takes_precedence() {
        let file = Some("from-file".to_string());
        let resolved = resolve_secret(Some("from-env".to_string()), file.as_ref());
        assert_eq!(resolved.unwrap().expose_secret(), "from-env");

        let resolved = resolve_secret(Some("  ".to_string()), file.as_ref());
        assert_eq!(resolved.unwrap().expose_secret(), "from-file");

        assert!(resolve_secret(None, None).is_none());
    }

    #[test]
    fn test_debug_masks_secrets() {
        let config = Config {
            cloud_api_key: Some("super-secret-key".to_string()),
            cloud_access_token: Some("super-secret-token".to_string()),
            ..Config::default()
        };
        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("super-secret-key"));
        assert!(!debug_output.contains("super-secret-token"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
