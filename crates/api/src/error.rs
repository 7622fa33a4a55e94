//! JSON error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use quill_common::QuillError;
use serde::Serialize;
use tracing::error;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>, code: &'static str) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: error.into(),
                code,
            },
        }
    }

    pub fn unauthorized(error: impl Into<String>, code: &'static str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error, code)
    }

    pub fn not_found(error: impl Into<String>, code: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, error, code)
    }
}

impl From<QuillError> for ApiError {
    fn from(err: QuillError) -> Self {
        let (status, code) = match err {
            QuillError::Auth(_) => (StatusCode::UNAUTHORIZED, "AUTH_ERROR"),
            QuillError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            QuillError::Session(_) => (StatusCode::NOT_FOUND, "SESSION_ERROR"),
            QuillError::Config(_) => (StatusCode::BAD_REQUEST, "CONFIG_ERROR"),
            QuillError::Llm(_) => (StatusCode::BAD_GATEWAY, "LLM_ERROR"),
            QuillError::Embedding(_) => (StatusCode::BAD_GATEWAY, "EMBEDDING_ERROR"),
            QuillError::VectorStore(_) => (StatusCode::BAD_GATEWAY, "VECTOR_STORE_ERROR"),
            QuillError::Io(_) | QuillError::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };
        if status.is_server_error() {
            error!(error = %err, code, "Request failed");
        }
        Self::new(status, err.to_string(), code)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (QuillError::Auth("x".into()), StatusCode::UNAUTHORIZED),
            (QuillError::RateLimited("x".into()), StatusCode::TOO_MANY_REQUESTS),
            (QuillError::Session("x".into()), StatusCode::NOT_FOUND),
            (QuillError::Config("x".into()), StatusCode::BAD_REQUEST),
            (QuillError::Llm("x".into()), StatusCode::BAD_GATEWAY),
            (QuillError::VectorStore("x".into()), StatusCode::BAD_GATEWAY),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn body_carries_message_and_code() {
        let err = ApiError::from(QuillError::RateLimited("slow down".into()));
        assert_eq!(err.body.code, "RATE_LIMITED");
        assert_eq!(err.body.error, "Rate limited: slow down");
    }
}
