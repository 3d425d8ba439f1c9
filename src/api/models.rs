//! API wire types shared by all handlers

use crate::completion::CompletionError;
use crate::error::ContextError;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

/// API error details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Machine-readable error codes
pub mod error_codes {
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const CONFLICT: &str = "CONFLICT";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const UPSTREAM_ERROR: &str = "UPSTREAM_ERROR";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Status and body for a failed request
pub fn error_response(error: &ContextError) -> (StatusCode, ApiError) {
    match error {
        ContextError::Validation(msg) => (
            StatusCode::BAD_REQUEST,
            ApiError::new(error_codes::VALIDATION_ERROR, msg.clone()),
        ),
        ContextError::SessionBusy(session_id) => (
            StatusCode::CONFLICT,
            ApiError::new(error_codes::CONFLICT, error.to_string())
                .with_details(serde_json::json!({ "sessionId": session_id })),
        ),
        ContextError::Completion(CompletionError::Timeout(_)) => (
            StatusCode::GATEWAY_TIMEOUT,
            ApiError::new(
                error_codes::TIMEOUT,
                "The story service took too long to respond. Please try again.",
            ),
        ),
        ContextError::Completion(e) => (
            StatusCode::BAD_GATEWAY,
            ApiError::new(
                error_codes::UPSTREAM_ERROR,
                "The story service is unavailable right now. Please try again.",
            )
            .with_details(serde_json::json!({ "cause": e.to_string() })),
        ),
        ContextError::Configuration(_) | ContextError::Internal(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::new(error_codes::INTERNAL_ERROR, "Internal server error"),
        ),
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ContextError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (ContextError::SessionBusy("s1".into()), StatusCode::CONFLICT),
            (
                ContextError::Completion(CompletionError::Timeout("slow".into())),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                ContextError::Completion(CompletionError::Api {
                    status: 503,
                    body: "down".into(),
                }),
                StatusCode::BAD_GATEWAY,
            ),
            (ContextError::Internal("oops".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected) in cases {
            assert_eq!(error_response(&error).0, expected, "{:?}", error);
        }
    }

    #[test]
    fn test_internal_details_not_exposed() {
        let (_, body) = error_response(&ContextError::Configuration("secret path".into()));
        assert!(!body.message.contains("secret path"));
        assert!(body.details.is_none());
    }
}
