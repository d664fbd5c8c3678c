//! Configuration module for Aigate
//!
//! Provides layered configuration loading from files, environment variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`AIGATE_*`)
//! 3. Configuration file (TOML)
//! 4. Default values (lowest priority)
//!
//! # Example
//!
//! ```rust
//! use aigate::config::AigateConfig;
//!
//! // Load defaults
//! let config = AigateConfig::default();
//! assert_eq!(config.server.port, 8000);
//!
//! // Parse from TOML
//! let toml = r#"
//! [server]
//! port = 9000
//! "#;
//! let config: AigateConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.server.port, 9000);
//! ```

pub mod billing;
pub mod database;
pub mod error;
pub mod logging;
pub mod server;
pub mod upstream;

pub use billing::BillingConfig;
pub use database::DatabaseConfig;
pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use server::ServerConfig;
pub use upstream::UpstreamConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Unified configuration for the Aigate server.
///
/// Aggregates all configuration sections: the HTTP listener, the upstream
/// provider, the billing store, billing policy, and logging.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AigateConfig {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Upstream provider settings
    pub upstream: UpstreamConfig,
    /// Billing store connection
    pub database: DatabaseConfig,
    /// Admission and validation policy
    pub billing: BillingConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AigateConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supports AIGATE_* environment variables for common settings.
    /// Invalid values are silently ignored (defaults are kept).
    pub fn with_env_overrides(mut self) -> Self {
        // Server settings
        if let Ok(port) = std::env::var("AIGATE_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(host) = std::env::var("AIGATE_HOST") {
            self.server.host = host;
        }

        // Store and upstream
        if let Ok(url) = std::env::var("AIGATE_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(url) = std::env::var("AIGATE_UPSTREAM_URL") {
            self.upstream.base_url = url;
        }

        // Logging settings
        if let Ok(level) = std::env::var("AIGATE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("AIGATE_LOG_FORMAT") {
            if let Ok(f) = format.parse() {
                self.logging.format = f;
            }
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation {
                field: "server.port".to_string(),
                message: "port must be non-zero".to_string(),
            });
        }
        if self.upstream.base_url.is_empty() {
            return Err(ConfigError::Validation {
                field: "upstream.base_url".to_string(),
                message: "URL cannot be empty".to_string(),
            });
        }
        if self.upstream.timeout_seconds == 0 {
            return Err(ConfigError::Validation {
                field: "upstream.timeout_seconds".to_string(),
                message: "timeout must be non-zero".to_string(),
            });
        }
        if self.database.url.is_empty() {
            return Err(ConfigError::Validation {
                field: "database.url".to_string(),
                message: "URL cannot be empty".to_string(),
            });
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation {
                field: "database.max_connections".to_string(),
                message: "pool size must be non-zero".to_string(),
            });
        }
        if self.billing.min_balance < 0.0 {
            return Err(ConfigError::Validation {
                field: "billing.min_balance".to_string(),
                message: "minimum balance cannot be negative".to_string(),
            });
        }
        if !crate::billing::PricingTable::default().contains(&self.billing.default_model) {
            return Err(ConfigError::Validation {
                field: "billing.default_model".to_string(),
                message: format!("'{}' is not a priced model", self.billing.default_model),
            });
        }
        if self.billing.max_messages == 0 {
            return Err(ConfigError::Validation {
                field: "billing.max_messages".to_string(),
                message: "message limit must be non-zero".to_string(),
            });
        }
        if self.billing.max_tokens_limit == 0 {
            return Err(ConfigError::Validation {
                field: "billing.max_tokens_limit".to_string(),
                message: "token limit must be non-zero".to_string(),
            });
        }
        if self.billing.default_max_tokens > self.billing.max_tokens_limit {
            return Err(ConfigError::Validation {
                field: "billing.default_max_tokens".to_string(),
                message: "default output budget exceeds max_tokens_limit".to_string(),
            });
        }
        Ok(())
    }
}
