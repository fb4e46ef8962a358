//! Configuration file parser for ~/.config/feedwalk/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Command-line flags and environment variables are applied on top by the
//! binary, then [`Config::validate`] checks the merged result.
use crate::crypto::KeyServiceOptions;
use crate::feed::{FetcherOptions, Scheme};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("No feed endpoint configured (set ATOMFEED_ENDPOINT or `endpoint`)")]
    MissingEndpoint,

    #[error("key_alias is set but no key_service_url is configured")]
    MissingKeyService,

    #[error("Invalid key_service_url: {0}")]
    InvalidKeyServiceUrl(#[from] url::ParseError),

    #[error("request_timeout_secs must be greater than zero")]
    ZeroTimeout,
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
///
/// SEC-015: Custom Debug impl masks `key_service_token`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host (and optional port) serving `/notifications/...`.
    pub endpoint: Option<String>,

    /// `http` or `https`.
    pub scheme: Scheme,

    /// Key reference; when set, feed bodies are encrypted envelopes.
    pub key_alias: Option<String>,

    /// Unwrap endpoint of the key service. Required with `key_alias`.
    pub key_service_url: Option<String>,

    /// Bearer token for the key service (alternative to KEY_SERVICE_TOKEN env var).
    pub key_service_token: Option<String>,

    /// Skip TLS certificate verification for https endpoints.
    pub insecure_tls: bool,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum accepted size of a single feed page.
    pub max_feed_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            scheme: Scheme::Https,
            key_alias: None,
            key_service_url: None,
            key_service_token: None,
            insecure_tls: false,
            request_timeout_secs: 30,
            max_feed_bytes: crate::feed::fetcher::DEFAULT_MAX_FEED_SIZE,
        }
    }
}

/// SEC-015: Mask key_service_token in Debug output to prevent secret leakage.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("endpoint", &self.endpoint)
            .field("scheme", &self.scheme)
            .field("key_alias", &self.key_alias)
            .field("key_service_url", &self.key_service_url)
            .field(
                "key_service_token",
                &self.key_service_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("insecure_tls", &self.insecure_tls)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_feed_bytes", &self.max_feed_bytes)
            .finish()
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 8] = [
        "endpoint",
        "scheme",
        "key_alias",
        "key_service_url",
        "key_service_token",
        "insecure_tls",
        "request_timeout_secs",
        "max_feed_bytes",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
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
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), scheme = %config.scheme, "Loaded configuration");
        Ok(config)
    }

    /// Checks the merged configuration before anything is built from it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.endpoint.as_deref().map(str::trim) {
            Some(endpoint) if !endpoint.is_empty() => {}
            _ => return Err(ConfigError::MissingEndpoint),
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.is_encrypted() {
            let url = self
                .key_service_url
                .as_deref()
                .ok_or(ConfigError::MissingKeyService)?;
            Url::parse(url)?;
        }
        Ok(())
    }

    /// True when a key alias is configured.
    pub fn is_encrypted(&self) -> bool {
        self.key_alias.as_deref().is_some_and(|a| !a.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Fetcher settings. `insecure_tls` only applies to https endpoints.
    pub fn fetcher_options(&self) -> FetcherOptions {
        let insecure_tls = match (self.insecure_tls, self.scheme) {
            (true, Scheme::Http) => {
                tracing::warn!("insecure_tls has no effect on an http endpoint, ignoring");
                false
            }
            (flag, _) => flag,
        };
        FetcherOptions {
            insecure_tls,
            request_timeout: self.request_timeout(),
            max_body_bytes: self.max_feed_bytes,
        }
    }

    /// Key service settings, or `None` in plaintext mode.
    pub fn key_service_options(&self) -> Result<Option<KeyServiceOptions>, ConfigError> {
        let Some(alias) = self.key_alias.as_deref().filter(|a| !a.is_empty()) else {
            return Ok(None);
        };
        let url = self
            .key_service_url
            .as_deref()
            .ok_or(ConfigError::MissingKeyService)?;

        let mut options = KeyServiceOptions::new(Url::parse(url)?, alias);
        options.token = self
            .key_service_token
            .clone()
            .map(SecretString::from);
        options.timeout = self.request_timeout();
        Ok(Some(options))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(name: &str, content: &str) -> (std::path::PathBuf, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.endpoint.is_none());
        assert_eq!(config.scheme, Scheme::Https);
        assert!(config.key_alias.is_none());
        assert!(!config.insecure_tls);
        assert_eq!(config.request_timeout_secs, 30);
        assert!(!config.is_encrypted());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/feedwalk_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.scheme, Scheme::Https);
    }

    #[test]
    fn test_empty_file_returns_default() {
        let (dir, path) = write_config("feedwalk_config_test_empty", "   \n  ");
        let config = Config::load(&path).unwrap();
        assert!(config.endpoint.is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let content = r#"
endpoint = "feeds.internal:8443"
scheme = "http"
key_alias = "alias/feed-key"
key_service_url = "https://keys.internal/unwrap"
key_service_token = "tok-123"
insecure_tls = true
request_timeout_secs = 5
max_feed_bytes = 2048
"#;
        let (dir, path) = write_config("feedwalk_config_test_full", content);

        let config = Config::load(&path).unwrap();
        assert_eq!(config.endpoint.as_deref(), Some("feeds.internal:8443"));
        assert_eq!(config.scheme, Scheme::Http);
        assert_eq!(config.key_alias.as_deref(), Some("alias/feed-key"));
        assert_eq!(config.key_service_token.as_deref(), Some("tok-123"));
        assert!(config.insecure_tls);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_feed_bytes, 2048);
        assert!(config.validate().is_ok());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (dir, path) = write_config("feedwalk_config_test_invalid", "this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_scheme_rejected() {
        let (dir, path) = write_config("feedwalk_config_test_scheme", "scheme = \"gopher\"\n");
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let (dir, path) = write_config(
            "feedwalk_config_test_unknown",
            "endpoint = \"a\"\ntotally_fake_key = 1\n",
        );
        let config = Config::load(&path).unwrap();
        assert_eq!(config.endpoint.as_deref(), Some("a"));
        std::fs::remove_dir_all(&dir).ok();
    }

    // SEC-014: File size limit
    #[test]
    fn test_too_large_file_rejected() {
        let (dir, path) =
            write_config("feedwalk_config_test_too_large", &"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_validate_requires_endpoint() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(ConfigError::MissingEndpoint)));

        let config = Config {
            endpoint: Some("  ".into()),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::MissingEndpoint)));
    }

    #[test]
    fn test_validate_key_alias_needs_key_service() {
        let config = Config {
            endpoint: Some("feeds.example.com".into()),
            key_alias: Some("alias/feed".into()),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::MissingKeyService)));

        let config = Config {
            key_service_url: Some("not a url".into()),
            ..config
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidKeyServiceUrl(_))
        ));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let config = Config {
            endpoint: Some("feeds.example.com".into()),
            request_timeout_secs: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroTimeout)));
    }

    #[test]
    fn test_insecure_ignored_for_http() {
        let config = Config {
            scheme: Scheme::Http,
            insecure_tls: true,
            ..Config::default()
        };
        assert!(!config.fetcher_options().insecure_tls);

        let config = Config {
            scheme: Scheme::Https,
            insecure_tls: true,
            ..Config::default()
        };
        assert!(config.fetcher_options().insecure_tls);
    }

    #[test]
    fn test_key_service_options_plaintext_mode() {
        let config = Config {
            key_alias: Some(String::new()),
            ..Config::default()
        };
        assert!(!config.is_encrypted());
        assert!(config.key_service_options().unwrap().is_none());
    }

    #[test]
    fn test_key_service_options_encrypted_mode() {
        let config = Config {
            key_alias: Some("alias/feed".into()),
            key_service_url: Some("https://keys.example.com/unwrap".into()),
            key_service_token: Some("tok".into()),
            ..Config::default()
        };
        let options = config.key_service_options().unwrap().unwrap();
        assert_eq!(options.key_id, "alias/feed");
        assert_eq!(options.url.as_str(), "https://keys.example.com/unwrap");
        assert!(options.token.is_some());
    }

    // SEC-015: Debug output masks the key service token
    #[test]
    fn test_debug_masks_token() {
        let config = Config {
            key_service_token: Some("super-secret-key-12345".into()),
            ..Config::default()
        };
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("super-secret-key-12345"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
