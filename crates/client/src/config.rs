//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DESTINY_API_BASE_URL` - Backend base URL (e.g., `https://api.destiny.app/`)
//!
//! ## Optional
//! - `DESTINY_HTTP_TIMEOUT_SECS` - Per-request timeout (default: 30)
//! - `DESTINY_CREDENTIALS_PATH` - JSON file for the persisted session (default: in-memory)
//! - `DESTINY_USER_AGENT` - `User-Agent` header (default: `destiny-client/<version>`)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::credentials::{CredentialStore, FileStore, MemoryStore, StoreError};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL, always ending in `/`
    pub base_url: Url,
    /// Per-request timeout
    pub timeout: Duration,
    /// `User-Agent` sent with every request
    pub user_agent: String,
    /// Persisted session file; `None` keeps the session in memory
    pub credentials_path: Option<PathBuf>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

impl ClientConfig {
    /// Configuration with defaults for everything but the base URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if `base_url` is not an absolute
    /// http(s) URL.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url("DESTINY_API_BASE_URL", base_url)?,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: default_user_agent(),
            credentials_path: None,
            sentry_dsn: None,
            sentry_environment: None,
        })
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(&|name| std::env::var(name).ok())
    }

    /// Build the configuration from `lookup`, which maps a variable name to
    /// its value.
    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = get_required_env(lookup, "DESTINY_API_BASE_URL")?;
        let base_url = parse_base_url("DESTINY_API_BASE_URL", &base_url)?;

        let timeout_secs = get_env_or_default(
            lookup,
            "DESTINY_HTTP_TIMEOUT_SECS",
            &DEFAULT_TIMEOUT_SECS.to_string(),
        )
        .trim()
        .parse::<u64>()
        .map_err(|e| {
            ConfigError::InvalidEnvVar("DESTINY_HTTP_TIMEOUT_SECS".to_string(), e.to_string())
        })?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "DESTINY_HTTP_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            timeout: Duration::from_secs(timeout_secs),
            user_agent: get_optional_env(lookup, "DESTINY_USER_AGENT")
                .unwrap_or_else(default_user_agent),
            credentials_path: get_optional_env(lookup, "DESTINY_CREDENTIALS_PATH")
                .map(PathBuf::from),
            sentry_dsn: get_optional_env(lookup, "SENTRY_DSN"),
            sentry_environment: get_optional_env(lookup, "SENTRY_ENVIRONMENT"),
        })
    }

    /// Open the credential store this configuration selects.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the configured file exists but cannot be read.
    pub fn open_store(&self) -> Result<Arc<dyn CredentialStore>, StoreError> {
        Ok(match &self.credentials_path {
            Some(path) => Arc::new(FileStore::open(path)?),
            None => Arc::new(MemoryStore::new()),
        })
    }
}

fn default_user_agent() -> String {
    concat!("destiny-client/", env!("CARGO_PKG_VERSION")).to_string()
}

fn parse_base_url(name: &str, raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(name.to_string(), e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            name.to_string(),
            format!("unsupported scheme {}", url.scheme()),
        ));
    }

    // Url::join drops the last path segment unless the base ends in '/'
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);

    Ok(url)
}

fn get_required_env(
    lookup: &dyn Fn(&str) -> Option<String>,
    name: &str,
) -> Result<String, ConfigError> {
    get_optional_env(lookup, name).ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn get_optional_env(lookup: &dyn Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).filter(|s| !s.trim().is_empty())
}

fn get_env_or_default(
    lookup: &dyn Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
) -> String {
    get_optional_env(lookup, name).unwrap_or_else(|| default.to_string())
}
