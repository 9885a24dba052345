//! Authentication module
//!
//! Bearer-token credentials for SimHub API calls.
//!
//! # Example
//!
//! ```
//! use simhub_client::auth::Credentials;
//!
//! let creds = Credentials::bearer("my-token");
//! assert_eq!(creds.authorization_header().as_deref(), Some("Bearer my-token"));
//!
//! let anonymous = Credentials::anonymous();
//! assert!(anonymous.authorization_header().is_none());
//! ```

use crate::config::ClientConfig;
use std::fmt;
use thiserror::Error;

/// Credential loading errors
#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
}

/// Credentials attached to API requests
#[derive(Clone, Default)]
pub struct Credentials {
    token: Option<String>,
}

impl Credentials {
    /// Bearer token credentials
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// No credentials; requests go out without an Authorization header
    pub fn anonymous() -> Self {
        Self { token: None }
    }

    /// Get the token (if any)
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Value for the `Authorization` header
    pub fn authorization_header(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }
}

// Keep tokens out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Factory methods for loading credentials
pub struct CredentialsProvider;

impl CredentialsProvider {
    /// Load the token from client configuration
    ///
    /// A missing or empty token yields anonymous credentials. A token that
    /// still contains an unexpanded `${VAR}` placeholder is rejected.
    pub fn from_config(config: &ClientConfig) -> Result<Credentials, CredentialsError> {
        match config.server.token.as_deref().map(str::trim) {
            None | Some("") => Ok(Credentials::anonymous()),
            Some(token) if token.contains("${") => Err(CredentialsError::InvalidCredentials(
                format!("token contains an unexpanded variable: {}", token),
            )),
            Some(token) => Self::validate(token).map(|_| Credentials::bearer(token)),
        }
    }

    /// Load the token from `SIMHUB_TOKEN`
    pub fn from_env() -> Result<Credentials, CredentialsError> {
        let token = std::env::var("SIMHUB_TOKEN")
            .map_err(|_| CredentialsError::MissingCredentials("SIMHUB_TOKEN not set".into()))?;
        let token = token.trim();
        if token.is_empty() {
            return Err(CredentialsError::MissingCredentials(
                "SIMHUB_TOKEN is empty".into(),
            ));
        }
        Self::validate(token)?;
        Ok(Credentials::bearer(token))
    }

    fn validate(token: &str) -> Result<(), CredentialsError> {
        if token.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(CredentialsError::InvalidCredentials(
                "token must not contain whitespace".into(),
            ));
        }
        Ok(())
    }
}
