//! Configuration management for the server.

use std::env;
use tether_engine::Resource;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Resources registered at startup; others are created on first write
    pub resources: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "1337".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let resources = match env::var("RESOURCES") {
            Ok(list) => parse_resources(&list)?,
            Err(_) => Vec::new(),
        };

        Ok(Self {
            host,
            port,
            resources,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 1337,
            resources: Vec::new(),
        }
    }
}

/// Parse a comma separated resource list, skipping empty entries.
pub fn parse_resources(list: &str) -> Result<Vec<String>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            Resource::new(name)
                .map(|resource| resource.name().to_string())
                .map_err(|_| ConfigError::InvalidResource(name.to_string()))
        })
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid resource name in RESOURCES: {0:?}")]
    InvalidResource(String),
}
