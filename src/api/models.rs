//! Model listing endpoint handler.

use crate::api::AppState;
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

/// OpenAI-style model list.
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<ModelEntry>,
}

/// One billable model with its prices in ₸ per million tokens.
#[derive(Debug, Serialize)]
pub struct ModelEntry {
    pub id: String,
    pub object: String,
    pub owned_by: String,
    pub input_price_per_million: f64,
    pub output_price_per_million: f64,
}

/// GET /v1/models - List billable models with pricing.
pub async fn handle(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    let data = state
        .pricing
        .model_names()
        .into_iter()
        .map(|name| {
            let price = state.pricing.get(&name);
            ModelEntry {
                id: name,
                object: "model".to_string(),
                owned_by: "aigate".to_string(),
                input_price_per_million: price.input_per_million,
                output_price_per_million: price.output_per_million,
            }
        })
        .collect();

    Json(ModelsResponse {
        object: "list".to_string(),
        data,
    })
}
