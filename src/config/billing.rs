//! Billing policy configuration

use serde::{Deserialize, Serialize};

/// Policy knobs for admission and request validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// Minimum balance (₸) required to use the API at all
    pub min_balance: f64,
    /// Model assumed when the request omits one
    pub default_model: String,
    /// Maximum number of messages per request
    pub max_messages: usize,
    /// Hard cap on the requested output budget
    pub max_tokens_limit: u32,
    /// Output budget assumed when the request omits max_tokens
    pub default_max_tokens: u32,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            min_balance: 0.01,
            default_model: "gpt-3.5-turbo".to_string(),
            max_messages: 50,
            max_tokens_limit: 8000,
            default_max_tokens: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_billing_config_defaults() {
        let config = BillingConfig::default();
        assert_eq!(config.min_balance, 0.01);
        assert_eq!(config.default_model, "gpt-3.5-turbo");
        assert_eq!(config.max_messages, 50);
        assert_eq!(config.max_tokens_limit, 8000);
        assert_eq!(config.default_max_tokens, 1000);
    }
}
