//! Login check and session authentication middleware.
//!
//! Login compares the configured username and password in constant time.
//! Every other `/api/v1` route requires `Authorization: Bearer <session_id>`
//! naming a live, logged-in session; `/health` and `/api/v1/login` are open.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::error::ApiError;
use crate::state::AppState;

/// Session ID of the authenticated caller, inserted by [`require_session`].
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

/// Credentials a login must match.
#[derive(Debug, Clone)]
pub struct LoginGate {
    username: Option<Vec<u8>>,
    password: Option<Vec<u8>>,
}

impl LoginGate {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into().into_bytes()),
            password: Some(password.into().into_bytes()),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            username: config.username.clone().map(String::into_bytes),
            password: config.password.clone().map(String::into_bytes),
        }
    }

    /// Whether any credentials are configured. Without them nobody can log in.
    pub fn is_configured(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    pub fn verify(&self, username: &str, password: &str) -> bool {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => {
                // Evaluate both so timing does not reveal which one failed
                let user_ok = constant_time_eq(u, username.as_bytes());
                let pass_ok = constant_time_eq(p, password.as_bytes());
                user_ok & pass_ok
            }
            _ => false,
        }
    }
}

/// Constant-time comparison to prevent timing attacks.
fn constant_time_eq(expected: &[u8], provided: &[u8]) -> bool {
    if expected.len() != provided.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (a, b) in expected.iter().zip(provided.iter()) {
        result |= a ^ b;
    }
    result == 0
}

/// Extract bearer token from Authorization header.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Reject requests without a live session; otherwise attach [`SessionId`].
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer_token(request.headers()).map(str::to_string) else {
        warn!("Missing Authorization header");
        return ApiError::unauthorized(
            "Missing or invalid Authorization header. Use: Authorization: Bearer <session_id>",
            "MISSING_SESSION",
        )
        .into_response();
    };

    if !state.sessions.touch(&token).await {
        warn!("Unknown or expired session");
        return ApiError::unauthorized("Unknown or expired session", "INVALID_SESSION")
            .into_response();
    }

    debug!(session_id = %token, "Session authenticated");
    request.extensions_mut().insert(SessionId(token));
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_correct() {
        let gate = LoginGate::new("fredrik", "hunter2");
        assert!(gate.verify("fredrik", "hunter2"));
    }

    #[test]
    fn test_verify_wrong_password() {
        let gate = LoginGate::new("fredrik", "hunter2");
        assert!(!gate.verify("fredrik", "hunter3"));
        assert!(!gate.verify("fredrik", ""));
    }

    #[test]
    fn test_verify_wrong_user() {
        let gate = LoginGate::new("fredrik", "hunter2");
        assert!(!gate.verify("anna", "hunter2"));
    }

    #[test]
    fn test_unconfigured_gate_rejects_everything() {
        let gate = LoginGate::from_config(&AuthConfig::default());
        assert!(!gate.is_configured());
        assert!(!gate.verify("", ""));
    }

    #[test]
    fn test_constant_time_eq_lengths() {
        assert!(constant_time_eq(b"short", b"short"));
        assert!(!constant_time_eq(b"short", b"longer-key-here"));
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc-123".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers), Some("abc-123"));
    }

    #[test]
    fn test_extract_bearer_token_missing() {
        let headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn test_extract_bearer_token_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Basic dXNlcjpwYXNz".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn test_extract_bearer_token_blank() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer   ".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers), None);
    }
}
