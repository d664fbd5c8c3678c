//! Database configuration

use serde::{Deserialize, Serialize};

/// Billing store connection settings. The URL scheme selects the backend:
/// `sqlite:` or `postgres:`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://aigate.db".to_string(),
            max_connections: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_defaults() {
        let config = DatabaseConfig::default();
        assert_eq!(config.url, "sqlite://aigate.db");
        assert_eq!(config.max_connections, 5);
    }
}
