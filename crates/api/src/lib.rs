//! HTTP API for Quill.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `POST /api/v1/login` - Exchange credentials for a session ID
//! - `POST /api/v1/logout` - End the session
//! - `GET /api/v1/personas` - List personas
//! - `POST /api/v1/personas/{name}/messages` - Chat turn (SSE or JSON)
//! - `GET|DELETE /api/v1/transcript` - Read or clear the transcript
//! - `POST /api/v1/journal/entries` - Index a journal entry
//! - `GET /api/v1/news` - Generate a news edition
//!
//! Everything except health and login needs `Authorization: Bearer <session_id>`.
//!
//! ```text
//! Client
//!    │
//!    ▼
//! ┌─────────────────┐
//! │   quill-api     │  sessions, rate limits, SSE
//! │     (Axum)      │
//! └────────┬────────┘
//!          ├──────────────────┐
//!          ▼                  ▼
//! ┌─────────────────┐ ┌─────────────────┐
//! │   quill-llm     │ │  quill-memory   │
//! │ chat + splitter │ │ embed + Qdrant  │
//! └─────────────────┘ └─────────────────┘
//! ```

pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod news;
pub mod persona;
pub mod rate_limit;
pub mod routes;
pub mod state;

use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use auth::{LoginGate, SessionId};
pub use config::AppConfig;
pub use persona::PersonaConfig;
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use state::{AppState, SessionStore};

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Create the API router with all routes configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    let protected = Router::new()
        .route("/api/v1/logout", post(routes::logout))
        .route("/api/v1/personas", get(routes::list_personas))
        .route("/api/v1/personas/{name}/messages", post(routes::persona_message))
        .route(
            "/api/v1/transcript",
            get(routes::get_transcript).delete(routes::clear_transcript),
        )
        .route("/api/v1/journal/entries", post(routes::index_entry))
        .route("/api/v1/news", get(routes::news))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/v1/login", post(routes::login))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the API server on the given address.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> anyhow::Result<()> {
    if !state.login.is_configured() {
        warn!("No login credentials configured (QUILL_USERNAME / QUILL_PASSWORD); every login will fail");
    }

    let router = create_router(state);

    info!(%addr, "Starting Quill API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
