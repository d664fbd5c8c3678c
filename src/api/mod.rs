//! # Billing API gateway
//!
//! OpenAI-compatible HTTP endpoints, metered against the billing store.
//!
//! ## Endpoints
//!
//! - `POST /v1/chat/completions` - Authenticated, billed chat completion
//! - `GET /v1/models` - List billable models and their prices
//! - `GET /health` - Liveness probe with uptime
//!
//! ## Request flow
//!
//! 1. Bearer token resolved against the billing store
//! 2. Request validated (roles, sizes, model, sampling parameters)
//! 3. Worst-case cost estimated and checked against the balance
//! 4. Request proxied upstream, never streaming
//! 5. Actual cost debited in one locked transaction
//! 6. Completion returned with usage and cost, or an OpenAI-format error:
//!
//! ```json
//! {
//!   "error": {
//!     "message": "Insufficient balance: required 0.0810 ₸, current 0.05 ₸",
//!     "type": "insufficient_balance"
//!   }
//! }
//! ```

mod completions;
mod health;
mod models;
pub mod types;

pub use types::*;

use crate::billing::PricingTable;
use crate::config::AigateConfig;
use crate::store::BillingStore;
use crate::upstream::{UpstreamClient, UpstreamError};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: Arc<AigateConfig>,
    pub store: Arc<dyn BillingStore>,
    pub upstream: UpstreamClient,
    pub pricing: Arc<PricingTable>,
    /// Server startup time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Create new application state with the given configuration and store.
    pub fn new(
        config: Arc<AigateConfig>,
        store: Arc<dyn BillingStore>,
    ) -> Result<Self, UpstreamError> {
        let upstream = UpstreamClient::new(&config.upstream)?;
        let pricing = Arc::new(PricingTable::new(&config.billing.default_model));

        Ok(Self {
            config,
            store,
            upstream,
            pricing,
            start_time: Instant::now(),
        })
    }
}

/// Create the main API router with all endpoints configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    let max_body = state.config.server.max_body_bytes;
    Router::new()
        .route("/v1/chat/completions", post(completions::handle))
        .route("/v1/models", get(models::handle))
        .route("/health", get(health::handle))
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
