//! Model pricing table for cost computation
//!
//! Prices are tenge (₸) per one million tokens, split by direction. The table
//! is built once at startup and never mutated, so it can be shared across
//! request handlers without synchronization.

use std::collections::HashMap;

/// Per-model price pair (₸ per 1M tokens).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    /// Price per 1M input (prompt) tokens
    pub input_per_million: f64,
    /// Price per 1M output (completion) tokens
    pub output_per_million: f64,
}

/// Immutable process-wide pricing table.
///
/// Lookups for unrecognized model names fall back to the default model's
/// pricing rather than failing. Request validation rejects unknown models
/// before costing, so the fallback is only reachable by direct library use.
pub struct PricingTable {
    prices: HashMap<String, ModelPricing>,
    default_model: String,
}

impl PricingTable {
    /// Build the table with the resale price list and a default model used
    /// as the fallback for unrecognized names.
    pub fn new(default_model: &str) -> Self {
        let mut prices = HashMap::new();

        prices.insert(
            "gpt-4o-mini".to_string(),
            ModelPricing {
                input_per_million: 27.0,
                output_per_million: 108.0,
            },
        );
        prices.insert(
            "gpt-4o".to_string(),
            ModelPricing {
                input_per_million: 450.0,
                output_per_million: 1800.0,
            },
        );
        prices.insert(
            "gpt-3.5-turbo".to_string(),
            ModelPricing {
                input_per_million: 27.0,
                output_per_million: 108.0,
            },
        );
        prices.insert(
            "deepseek-r1".to_string(),
            ModelPricing {
                input_per_million: 99.0,
                output_per_million: 394.0,
            },
        );
        prices.insert(
            "deepseek-chat".to_string(),
            ModelPricing {
                input_per_million: 25.0,
                output_per_million: 50.0,
            },
        );
        prices.insert(
            "claude-3.5-sonnet".to_string(),
            ModelPricing {
                input_per_million: 540.0,
                output_per_million: 2700.0,
            },
        );
        prices.insert(
            "gemini-2.0-flash".to_string(),
            ModelPricing {
                input_per_million: 54.0,
                output_per_million: 450.0,
            },
        );

        Self {
            prices,
            default_model: default_model.to_string(),
        }
    }

    /// Get pricing for a model, falling back to the default model.
    pub fn get(&self, model: &str) -> ModelPricing {
        if let Some(pricing) = self.prices.get(model) {
            return *pricing;
        }
        self.prices
            .get(&self.default_model)
            .copied()
            .unwrap_or(ModelPricing {
                input_per_million: 0.0,
                output_per_million: 0.0,
            })
    }

    /// Whether the model name is present in the table (no fallback).
    pub fn contains(&self, model: &str) -> bool {
        self.prices.contains_key(model)
    }

    /// Default model name used when a request omits the model field.
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Sorted list of supported model names, for validation messages and
    /// the models endpoint.
    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.prices.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::new("gpt-3.5-turbo")
    }
}
