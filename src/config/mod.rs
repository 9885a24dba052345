//! Configuration module for the SimHub client
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation.

use crate::auth::{CredentialsError, CredentialsProvider};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Maximum number of parts the service accepts for one multipart upload
pub const MAX_PARTS: u64 = 10_000;

/// Default part size (5MB)
pub const DEFAULT_PART_SIZE: u64 = 5 * 1024 * 1024;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// # Examples
///
/// ```ignore
/// std::env::set_var("SIMHUB_TOKEN", "secret");
/// assert_eq!(expand_env_vars("Bearer ${SIMHUB_TOKEN}"), "Bearer secret");
/// assert_eq!(expand_env_vars("${MISSING:-fallback}"), "fallback");
/// ```
pub(crate) fn expand_env_vars(s: &str) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}") {
        Ok(re) => re,
        Err(_) => return s.to_string(),
    };
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default: keep the placeholder
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);
    result
}

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

impl ClientConfig {
    /// Configuration for `base_url` with defaults everywhere else
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            server: ServerConfig {
                base_url: base_url.into(),
                token,
            },
            http: HttpConfig::default(),
            upload: UploadConfig::default(),
        }
    }

    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Build configuration from environment variables
    ///
    /// Reads `SIMHUB_BASE_URL` (required), `SIMHUB_TOKEN`,
    /// `SIMHUB_CONCURRENCY` and `SIMHUB_PART_SIZE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var("SIMHUB_BASE_URL")
            .map_err(|_| ConfigError::ValidationError("SIMHUB_BASE_URL not set".into()))?;
        let token = token_from_env()?;

        let mut config = Self::new(base_url, token);
        if let Some(concurrency) = env_number("SIMHUB_CONCURRENCY")? {
            config.upload.concurrency = concurrency as usize;
        }
        if let Some(part_size) = env_number("SIMHUB_PART_SIZE")? {
            config.upload.part_size = part_size;
        }

        config.validate()?;
        Ok(config)
    }

    /// Base URL without trailing slash
    pub fn base_url(&self) -> &str {
        self.server.base_url.trim_end_matches('/')
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_http_url(&self.server.base_url) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid base_url '{}': must start with http:// or https://",
                self.server.base_url
            )));
        }

        if self.http.connect_timeout_secs == 0 || self.http.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "HTTP timeouts must be greater than zero".into(),
            ));
        }

        let upload = &self.upload;
        if upload.concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "upload.concurrency must be at least 1".into(),
            ));
        }

        if upload.part_size == 0 {
            return Err(ConfigError::ValidationError(
                "upload.part_size must be greater than zero".into(),
            ));
        }

        if upload.multipart_threshold.div_ceil(upload.part_size) > MAX_PARTS {
            return Err(ConfigError::ValidationError(format!(
                "upload.part_size {} is too small: multipart_threshold {} would need more than {} parts",
                upload.part_size, upload.multipart_threshold, MAX_PARTS
            )));
        }

        Ok(())
    }
}

/// Token from `SIMHUB_TOKEN`
///
/// Unset or empty means anonymous access; a malformed token is an error.
pub fn token_from_env() -> Result<Option<String>, ConfigError> {
    match CredentialsProvider::from_env() {
        Ok(credentials) => Ok(credentials.token().map(str::to_string)),
        Err(CredentialsError::MissingCredentials(_)) => Ok(None),
        Err(e) => Err(ConfigError::ValidationError(e.to_string())),
    }
}

fn env_number(name: &str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::ValidationError(format!("{} is not a number: '{}'", name, raw))),
        Err(_) => Ok(None),
    }
}

/// SimHub service endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub base_url: String,
    /// Bearer token. Supports ${VAR} expansion.
    #[serde(default)]
    pub token: Option<String>,
}

/// HTTP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            user_agent: None,
        }
    }
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold: u64,
    #[serde(default = "default_part_size")]
    pub part_size: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            multipart_threshold: default_multipart_threshold(),
            part_size: default_part_size(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_multipart_threshold() -> u64 {
    52428800 // 50MB
}

fn default_part_size() -> u64 {
    DEFAULT_PART_SIZE
}

fn default_concurrency() -> usize {
    4
}
