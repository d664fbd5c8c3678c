//! Bearer-token authentication
//!
//! Resolves the `Authorization: Bearer <secret>` header against the billing
//! store. All failure modes (missing header, malformed scheme, unknown or
//! revoked key) collapse to the same 401 so callers cannot probe which keys
//! exist.

use crate::api::ApiError;
use crate::store::{BillingStore, CallerIdentity};
use axum::http::HeaderMap;
use tracing::warn;

/// Extract the bearer secret from the Authorization header.
pub fn bearer_secret(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|s| !s.is_empty())
}

/// Authenticate the request, returning the caller's identity with a balance
/// snapshot.
pub async fn authenticate(
    store: &dyn BillingStore,
    headers: &HeaderMap,
) -> Result<CallerIdentity, ApiError> {
    let Some(secret) = bearer_secret(headers) else {
        warn!("Request without a bearer token");
        return Err(ApiError::unauthenticated());
    };

    match store.resolve_api_key(secret).await {
        Ok(Some(identity)) => Ok(identity),
        Ok(None) => {
            warn!("Unknown or revoked API key");
            Err(ApiError::unauthenticated())
        }
        Err(e) => {
            tracing::error!(error = %e, "API key lookup failed");
            Err(ApiError::internal())
        }
    }
}
