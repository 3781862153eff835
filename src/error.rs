// Error handling module
// Defines error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors that can occur while serving a tool call
#[derive(Error, Debug)]
pub enum ApiError {
    /// Bearer token could not be decoded
    #[error("Token decode error: {0}")]
    Decode(String),

    /// Auth endpoint rejected the credentials
    #[error("Authentication failed: {status} - {message}")]
    AuthError { status: u16, message: String },

    /// Non-success status from a LevelPlay resource endpoint
    #[error("LevelPlay API error: {status} - {message}")]
    UpstreamError { status: u16, message: String },

    /// Success response whose body is not JSON
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Timeout, connection failure or other client-side failure
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Inbound request did not carry the gateway API key
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Tool argument validation error
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ApiError {
    /// Classify a reqwest failure as a transport error
    pub fn transport(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            "timeout"
        } else if err.is_connect() {
            "connection_failed"
        } else if err.is_request() {
            "request_error"
        } else if err.is_body() {
            "body_error"
        } else {
            "unknown"
        };
        ApiError::TransportError(format!("{} (kind: {})", err, kind))
    }

    /// Short label used in structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Decode(_) => "decode",
            ApiError::AuthError { .. } => "auth",
            ApiError::UpstreamError { .. } => "upstream",
            ApiError::ParseError(_) => "parse",
            ApiError::TransportError(_) => "transport",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::ValidationError(_) => "validation",
        }
    }
}

/// Only the gateway key check rejects at the HTTP layer; tool failures travel
/// inside JSON-RPC responses.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_GATEWAY,
        };

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": self.kind(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_error_messages() {
        let err = ApiError::Decode("missing payload segment".to_string());
        assert_eq!(err.to_string(), "Token decode error: missing payload segment");

        let err = ApiError::AuthError {
            status: 403,
            message: "bad secret".to_string(),
        };
        assert_eq!(err.to_string(), "Authentication failed: 403 - bad secret");

        let err = ApiError::UpstreamError {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "LevelPlay API error: 500 - boom");
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(ApiError::ParseError("x".into()).kind(), "parse");
        assert_eq!(ApiError::TransportError("x".into()).kind(), "transport");
        assert_eq!(ApiError::ValidationError("x".into()).kind(), "validation");
        assert_eq!(ApiError::Unauthorized("x".into()).kind(), "unauthorized");
    }

    #[tokio::test]
    async fn test_unauthorized_response() {
        let response = ApiError::Unauthorized("Invalid or missing API Key".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_json(response).await;
        assert_eq!(body["error"]["type"], "unauthorized");
        assert_eq!(
            body["error"]["message"],
            "Unauthorized: Invalid or missing API Key"
        );
    }
}
