//! Configuration loader with environment variable expansion

use super::{expand_env_vars, ClientConfig, ConfigError};
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ClientConfig, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<ClientConfig, ConfigError> {
        let expanded = expand_env_vars(content);
        let config: ClientConfig = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }
}
