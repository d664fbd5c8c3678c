//! Chat completions endpoint handler.
//!
//! The billed request path: authenticate, validate, estimate, admit, proxy,
//! debit, respond. The debit happens after the upstream call so the account
//! pays the actual cost, not the estimate; if the debit fails the completion
//! text is discarded and the caller gets the billing error.

use crate::api::{
    ApiError, AppState, ChatCompletionRequest, ChatCompletionResponse, Choice, ResponseMessage,
    Usage,
};
use crate::auth;
use crate::billing::{
    check_admission, completion_cost, estimate_tokens, estimate_tokens_uncapped, round_money,
    PricingTable, TokenEstimateError, MAX_MESSAGE_CHARS,
};
use crate::config::BillingConfig;
use crate::store::{CompletionCharge, StoreError};
use crate::upstream::{UpstreamChatRequest, UpstreamError, UpstreamMessage};
use axum::{extract::State, http::HeaderMap, Json};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

const ENDPOINT: &str = "/v1/chat/completions";

const ALLOWED_ROLES: &[&str] = &["user", "assistant", "system"];

/// A request that passed validation, with all defaults applied.
#[derive(Debug)]
struct ValidatedRequest {
    model: String,
    messages: Vec<UpstreamMessage>,
    max_tokens: u32,
    temperature: f32,
}

/// POST /v1/chat/completions - Handle billed chat completion requests.
pub async fn handle(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Json<ChatCompletionResponse>, ApiError> {
    let start_time = std::time::Instant::now();

    let caller = auth::authenticate(state.store.as_ref(), &headers).await?;

    let validated = validate_request(&request, &state.config.billing, &state.pricing)?;

    info!(
        account_id = caller.account_id,
        model = %validated.model,
        messages = validated.messages.len(),
        "Chat completion request"
    );

    // Worst case: the full output budget gets consumed
    let prompt = joined_content(&validated.messages);
    let input_estimate = estimate_tokens(&prompt).map_err(|e| match e {
        TokenEstimateError::PayloadTooLarge { length, limit } => ApiError::invalid_request(
            &format!("Request too large: {} characters, maximum is {}", length, limit),
        ),
    })?;
    let estimated_cost = completion_cost(
        &state.pricing,
        &validated.model,
        input_estimate,
        u64::from(validated.max_tokens),
    );

    if let Err(e) = check_admission(
        caller.balance,
        estimated_cost,
        state.config.billing.min_balance,
    ) {
        warn!(
            account_id = caller.account_id,
            estimated_cost,
            balance = caller.balance,
            "Request rejected at admission"
        );
        let crate::billing::AdmissionError::InsufficientBalance { required, current } = e;
        return Err(ApiError::insufficient_balance(required, current));
    }

    let upstream_request = UpstreamChatRequest {
        model: validated.model.clone(),
        messages: validated.messages,
        max_tokens: validated.max_tokens,
        temperature: validated.temperature,
        stream: false,
    };

    let completion = state
        .upstream
        .chat_completion(&upstream_request)
        .await
        .map_err(|e| match e {
            UpstreamError::Timeout(seconds) => {
                warn!(account_id = caller.account_id, seconds, "Upstream timeout");
                ApiError::upstream_timeout(seconds)
            }
            UpstreamError::Status { status, message } => {
                warn!(account_id = caller.account_id, status, "Upstream error");
                ApiError::upstream(status, &message)
            }
            UpstreamError::Transport(msg) | UpstreamError::InvalidResponse(msg) => {
                error!(account_id = caller.account_id, error = %msg, "Upstream call failed");
                ApiError::internal()
            }
        })?;

    // Bill actual usage when the provider reports it, our estimates otherwise
    let (input_tokens, output_tokens) = match completion.usage {
        Some(usage) => (usage.prompt_tokens, usage.completion_tokens),
        None => {
            let output = completion
                .choices
                .first()
                .map(|c| estimate_tokens_uncapped(&c.message.content))
                .unwrap_or(0);
            (input_estimate, output)
        }
    };
    let cost = completion_cost(&state.pricing, &validated.model, input_tokens, output_tokens);

    let charge = CompletionCharge {
        account_id: caller.account_id,
        api_key_id: caller.api_key_id,
        model: validated.model.clone(),
        endpoint: ENDPOINT.to_string(),
        input_tokens,
        output_tokens,
        cost,
        duration_ms: start_time.elapsed().as_millis() as u64,
        client_addr: client_addr(&headers),
    };

    let receipt = match state.store.charge_completion(&charge).await {
        Ok(receipt) => receipt,
        Err(StoreError::InsufficientBalance { required, current }) => {
            // The completion is paid content; without the debit it is dropped
            warn!(
                account_id = caller.account_id,
                required, current, "Balance exhausted between admission and debit"
            );
            return Err(ApiError::insufficient_balance(required, current));
        }
        Err(e) => {
            error!(account_id = caller.account_id, error = %e, "Debit transaction failed");
            return Err(ApiError::internal());
        }
    };

    info!(
        account_id = caller.account_id,
        model = %validated.model,
        input_tokens,
        output_tokens,
        cost = receipt.cost,
        balance = receipt.balance_after,
        duration_ms = charge.duration_ms,
        "Chat completion billed"
    );

    let choices = completion
        .choices
        .into_iter()
        .map(|c| Choice {
            index: c.index,
            message: ResponseMessage {
                role: c.message.role,
                content: c.message.content,
            },
            finish_reason: c.finish_reason,
        })
        .collect();

    Ok(Json(ChatCompletionResponse {
        id: completion
            .id
            .unwrap_or_else(|| format!("chatcmpl-{}", uuid::Uuid::new_v4())),
        object: "chat.completion".to_string(),
        created: Utc::now().timestamp(),
        model: validated.model,
        choices,
        usage: Usage {
            prompt_tokens: input_tokens,
            completion_tokens: output_tokens,
            total_tokens: input_tokens + output_tokens,
            cost: round_money(receipt.cost),
        },
    }))
}

/// Apply the validation rules and defaults from the billing policy.
fn validate_request(
    request: &ChatCompletionRequest,
    policy: &BillingConfig,
    pricing: &PricingTable,
) -> Result<ValidatedRequest, ApiError> {
    if request.stream {
        return Err(ApiError::invalid_request("Streaming is not supported"));
    }

    if request.messages.is_empty() {
        return Err(ApiError::invalid_request("messages cannot be empty"));
    }
    if request.messages.len() > policy.max_messages {
        return Err(ApiError::invalid_request(&format!(
            "Too many messages: maximum is {}",
            policy.max_messages
        )));
    }

    let mut messages = Vec::with_capacity(request.messages.len());
    for message in &request.messages {
        if !ALLOWED_ROLES.contains(&message.role.as_str()) {
            return Err(ApiError::invalid_request(&format!(
                "Invalid role '{}': must be one of user, assistant, system",
                message.role
            )));
        }
        let Some(content) = message.content.as_str() else {
            return Err(ApiError::invalid_request("Message content must be a string"));
        };
        let length = content.chars().count();
        if length > MAX_MESSAGE_CHARS {
            return Err(ApiError::invalid_request(&format!(
                "Message content too long: {} characters, maximum is {}",
                length, MAX_MESSAGE_CHARS
            )));
        }
        messages.push(UpstreamMessage {
            role: message.role.clone(),
            content: content.to_string(),
        });
    }

    // The default model goes through the same lookup as an explicit one, so a
    // policy naming an unpriced default cannot slip into the costing path
    let model = request
        .model
        .clone()
        .unwrap_or_else(|| policy.default_model.clone());
    if !pricing.contains(&model) {
        return Err(ApiError::invalid_request(&format!(
            "Unknown model '{}'",
            model
        )));
    }

    let max_tokens = request.max_tokens.unwrap_or(policy.default_max_tokens);
    if max_tokens == 0 || max_tokens > policy.max_tokens_limit {
        return Err(ApiError::invalid_request(&format!(
            "max_tokens must be between 1 and {}",
            policy.max_tokens_limit
        )));
    }

    let temperature = request.temperature.unwrap_or(1.0);
    if !(0.0..=2.0).contains(&temperature) {
        return Err(ApiError::invalid_request(
            "temperature must be between 0 and 2",
        ));
    }

    Ok(ValidatedRequest {
        model,
        messages,
        max_tokens,
        temperature,
    })
}

/// The text that the input token estimate is computed over.
fn joined_content(messages: &[UpstreamMessage]) -> String {
    messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Best-effort client address from the forwarding header.
fn client_addr(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ChatMessage;
    use serde_json::json;

    fn policy() -> BillingConfig {
        BillingConfig::default()
    }

    fn pricing() -> PricingTable {
        PricingTable::default()
    }

    fn message(role: &str, content: serde_json::Value) -> ChatMessage {
        ChatMessage {
            role: role.to_string(),
            content,
        }
    }

    fn basic_request() -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: Some("gpt-4o-mini".to_string()),
            messages: vec![message("user", json!("Hello"))],
            stream: false,
            temperature: None,
            max_tokens: None,
        }
    }

    #[test]
    fn test_validate_applies_defaults() {
        let mut request = basic_request();
        request.model = None;
        let validated = validate_request(&request, &policy(), &pricing()).unwrap();
        assert_eq!(validated.model, "gpt-3.5-turbo");
        assert_eq!(validated.max_tokens, 1000);
        assert_eq!(validated.temperature, 1.0);
    }

    #[test]
    fn test_validate_rejects_stream() {
        let mut request = basic_request();
        request.stream = true;
        let err = validate_request(&request, &policy(), &pricing()).unwrap_err();
        assert!(err.error.message.contains("Streaming"));
    }

    #[test]
    fn test_validate_rejects_empty_messages() {
        let mut request = basic_request();
        request.messages.clear();
        assert!(validate_request(&request, &policy(), &pricing()).is_err());
    }

    #[test]
    fn test_validate_rejects_too_many_messages() {
        let mut request = basic_request();
        request.messages = (0..51).map(|_| message("user", json!("hi"))).collect();
        let err = validate_request(&request, &policy(), &pricing()).unwrap_err();
        assert!(err.error.message.contains("Too many messages"));
    }

    #[test]
    fn test_validate_rejects_bad_role() {
        let mut request = basic_request();
        request.messages = vec![message("tool", json!("result"))];
        let err = validate_request(&request, &policy(), &pricing()).unwrap_err();
        assert!(err.error.message.contains("Invalid role 'tool'"));
    }

    #[test]
    fn test_validate_rejects_non_string_content() {
        let mut request = basic_request();
        request.messages = vec![message("user", json!([{"type": "text"}]))];
        let err = validate_request(&request, &policy(), &pricing()).unwrap_err();
        assert!(err.error.message.contains("must be a string"));
    }

    #[test]
    fn test_validate_rejects_oversized_content() {
        let mut request = basic_request();
        request.messages = vec![message("user", json!("x".repeat(100_001)))];
        let err = validate_request(&request, &policy(), &pricing()).unwrap_err();
        assert!(err.error.message.contains("too long"));
    }

    #[test]
    fn test_validate_rejects_unknown_model() {
        let mut request = basic_request();
        request.model = Some("gpt-7".to_string());
        let err = validate_request(&request, &policy(), &pricing()).unwrap_err();
        assert!(err.error.message.contains("Unknown model 'gpt-7'"));
    }

    #[test]
    fn test_validate_rejects_unlisted_default_model() {
        // A default model missing from the price table must not reach costing,
        // where the unknown-name fallback would bill it at 0 ₸
        let mut request = basic_request();
        request.model = None;
        let mut policy = policy();
        policy.default_model = "llama-3-internal".to_string();
        let err = validate_request(&request, &policy, &pricing()).unwrap_err();
        assert!(err.error.message.contains("Unknown model 'llama-3-internal'"));
    }

    #[test]
    fn test_validate_max_tokens_bounds() {
        let mut request = basic_request();
        request.max_tokens = Some(0);
        assert!(validate_request(&request, &policy(), &pricing()).is_err());

        request.max_tokens = Some(8001);
        assert!(validate_request(&request, &policy(), &pricing()).is_err());

        request.max_tokens = Some(8000);
        assert!(validate_request(&request, &policy(), &pricing()).is_ok());
    }

    #[test]
    fn test_validate_temperature_bounds() {
        let mut request = basic_request();
        request.temperature = Some(2.1);
        assert!(validate_request(&request, &policy(), &pricing()).is_err());

        request.temperature = Some(-0.1);
        assert!(validate_request(&request, &policy(), &pricing()).is_err());

        request.temperature = Some(0.0);
        assert!(validate_request(&request, &policy(), &pricing()).is_ok());

        request.temperature = Some(2.0);
        assert!(validate_request(&request, &policy(), &pricing()).is_ok());
    }

    #[test]
    fn test_joined_content_single_space_separator() {
        let messages = vec![
            UpstreamMessage {
                role: "system".to_string(),
                content: "Be brief".to_string(),
            },
            UpstreamMessage {
                role: "user".to_string(),
                content: "Hello".to_string(),
            },
        ];
        assert_eq!(joined_content(&messages), "Be brief Hello");
    }

    #[test]
    fn test_client_addr_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "203.0.113.7, 10.0.0.1".parse().unwrap(),
        );
        assert_eq!(client_addr(&headers), Some("203.0.113.7".to_string()));
    }

    #[test]
    fn test_client_addr_missing_header() {
        assert_eq!(client_addr(&HeaderMap::new()), None);
    }
}
