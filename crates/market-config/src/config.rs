//! Configuration management for the session client.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default API base URL (can be overridden at compile time via MARKETPLACE_API_URL env var).
pub const DEFAULT_API_BASE_URL: &str = match option_env!("MARKETPLACE_API_URL") {
    Some(url) => url,
    None => "http://localhost:3000/api",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default transport timeout for API calls, in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;

/// Default durable key for the credential pair.
pub const DEFAULT_CREDENTIALS_KEY: &str = "marketplace.credentials";

/// Default durable key for the persisted session snapshot.
pub const DEFAULT_SESSION_KEY: &str = "marketplace.session";

const ENV_LOG_LEVEL: &str = "MARKETPLACE_LOG_LEVEL";
const ENV_API_URL: &str = "MARKETPLACE_API_URL";
const ENV_REQUEST_TIMEOUT_MS: &str = "MARKETPLACE_REQUEST_TIMEOUT_MS";

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Base URL every API path is joined onto.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Transport timeout applied by the HTTP client.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Storage key holding the credential pair.
    #[serde(default = "default_credentials_key")]
    pub credentials_key: String,
    /// Storage key holding the persisted session snapshot.
    #[serde(default = "default_session_key")]
    pub session_key: String,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_credentials_key() -> String {
    DEFAULT_CREDENTIALS_KEY.to_string()
}

fn default_session_key() -> String {
    DEFAULT_SESSION_KEY.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            api_base_url: default_api_base_url(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            credentials_key: default_credentials_key(),
            session_key: default_session_key(),
        }
    }
}

impl Config {
    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| CoreError::ParseConfig {
            path: path.to_path_buf(),
            source,
        })
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production, a map in tests). Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(level) = read(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(url) = read(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(raw) = read(ENV_REQUEST_TIMEOUT_MS) {
            match raw.parse::<u64>() {
                Ok(ms) => self.request_timeout_ms = ms,
                Err(_) => tracing::warn!(value = %raw, "Ignoring invalid request timeout override"),
            }
        }
    }

    /// Reject configurations the client cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        self.api_base_url()?;
        if self.request_timeout_ms == 0 {
            return Err(CoreError::Invalid(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.credentials_key.trim().is_empty() || self.session_key.trim().is_empty() {
            return Err(CoreError::Invalid("storage keys must be non-empty".to_string()));
        }
        if self.credentials_key == self.session_key {
            return Err(CoreError::Invalid(
                "credentials_key and session_key must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the API base URL as a parsed URL.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_base_url).map_err(|source| CoreError::InvalidApiUrl {
            url: self.api_base_url.clone(),
            source,
        })
    }

    /// Transport timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
