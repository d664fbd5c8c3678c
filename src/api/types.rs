//! Request and response types for the OpenAI-compatible billing API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

/// Chat completion request matching OpenAI format.
///
/// `model` and `max_tokens` are optional; the billing policy supplies
/// defaults. `content` is deserialized as raw JSON so the validator can
/// reject non-string content with the proper error body instead of an
/// extractor rejection.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// A single message in the conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: serde_json::Value,
}

/// Chat completion response returned to the caller, with the billing
/// extension on the usage block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

/// A single choice in the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ResponseMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Assistant message in a response choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub role: String,
    pub content: String,
}

/// Token usage statistics, extended with the billed cost in ₸.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost: f64,
}

/// API error response in OpenAI format.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub error: ApiErrorBody,
    #[serde(skip)]
    status: StatusCode,
}

/// Error details.
#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorBody {
    pub message: String,
    pub r#type: String,
}

impl ApiError {
    fn new(status: StatusCode, error_type: &str, message: String) -> Self {
        Self {
            error: ApiErrorBody {
                message,
                r#type: error_type.to_string(),
            },
            status,
        }
    }

    /// Missing, malformed, unknown, or revoked API key (401).
    pub fn unauthenticated() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "authentication_error",
            "Invalid or missing API key".to_string(),
        )
    }

    /// Request failed validation (400).
    pub fn invalid_request(message: &str) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "invalid_request_error",
            message.to_string(),
        )
    }

    /// Balance cannot cover the request (402).
    pub fn insufficient_balance(required: f64, current: f64) -> Self {
        Self::new(
            StatusCode::PAYMENT_REQUIRED,
            "insufficient_balance",
            format!(
                "Insufficient balance: required {:.4} ₸, current {:.2} ₸",
                required, current
            ),
        )
    }

    /// Upstream provider error, mirrored with the provider's status.
    pub fn upstream(status: u16, message: &str) -> Self {
        let status =
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, "upstream_error", message.to_string())
    }

    /// Upstream call timed out (408).
    pub fn upstream_timeout(seconds: u64) -> Self {
        Self::new(
            StatusCode::REQUEST_TIMEOUT,
            "timeout_error",
            format!("Upstream request timed out after {} seconds", seconds),
        )
    }

    /// Internal failure (500). The message never carries internal detail.
    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "server_error",
            "Internal server error".to_string(),
        )
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_deserialize_minimal() {
        let json = json!({"messages": [{"role": "user", "content": "Hello"}]});
        let request: ChatCompletionRequest = serde_json::from_value(json).unwrap();
        assert!(request.model.is_none());
        assert!(!request.stream);
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].content.as_str(), Some("Hello"));
    }

    #[test]
    fn test_request_deserialize_full() {
        let json = json!({
            "model": "gpt-4o",
            "messages": [{"role": "system", "content": "Be brief"}],
            "max_tokens": 256,
            "temperature": 0.5,
            "stream": true
        });
        let request: ChatCompletionRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.model.as_deref(), Some("gpt-4o"));
        assert_eq!(request.max_tokens, Some(256));
        assert!(request.stream);
    }

    #[test]
    fn test_request_accepts_non_string_content() {
        // The validator rejects this, not the deserializer
        let json = json!({"messages": [{"role": "user", "content": [1, 2]}]});
        let request: ChatCompletionRequest = serde_json::from_value(json).unwrap();
        assert!(request.messages[0].content.as_str().is_none());
    }

    #[test]
    fn test_error_payload_shape() {
        let error = ApiError::invalid_request("messages cannot be empty");
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["error"]["message"], "messages cannot be empty");
        assert_eq!(json["error"]["type"], "invalid_request_error");
        // The status code travels in the HTTP layer, not the body
        assert!(json.get("status").is_none());
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            ApiError::unauthenticated().status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::invalid_request("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::insufficient_balance(1.0, 0.5).status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            ApiError::upstream_timeout(45).status_code(),
            StatusCode::REQUEST_TIMEOUT
        );
        assert_eq!(
            ApiError::internal().status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_upstream_error_mirrors_status() {
        let error = ApiError::upstream(429, "Rate limit exceeded");
        assert_eq!(error.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(error.error.r#type, "upstream_error");
    }

    #[test]
    fn test_upstream_error_invalid_status_becomes_500() {
        let error = ApiError::upstream(1000, "weird");
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_insufficient_balance_message_precision() {
        let error = ApiError::insufficient_balance(0.081, 0.05);
        assert_eq!(
            error.error.message,
            "Insufficient balance: required 0.0810 ₸, current 0.05 ₸"
        );
    }
}
