//! HTTP route handlers for the API.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::StreamExt;
use quill_common::{ChatMessage, QuillError};
use quill_memory::JournalEntry;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, warn};

use crate::AppState;
use crate::auth::SessionId;
use crate::chat::{self, TurnEvent};
use crate::error::ApiError;
use crate::news::{self, NewsEdition};
use crate::persona::PersonaSummary;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub active_sessions: usize,
    pub retrieval_enabled: bool,
    pub model: String,
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        active_sessions: state.sessions.len().await,
        retrieval_enabled: state.retriever.is_some(),
        model: state.llm.model_name().to_string(),
    })
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub session_id: String,
    pub user: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    if !state.login.verify(&request.username, &request.password) {
        warn!("Rejected login attempt");
        return Err(ApiError::unauthorized(
            "Invalid username or password",
            "INVALID_CREDENTIALS",
        ));
    }

    for expired in state.sessions.purge_idle().await {
        state.limiter.forget(&expired);
    }

    let session = state.sessions.create(&request.username).await;
    info!(session_id = %session.id, "User logged in");

    Ok(Json(LoginResponse {
        session_id: session.id,
        user: request.username,
    }))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(SessionId(session_id)): Extension<SessionId>,
) -> StatusCode {
    state.sessions.remove(&session_id).await;
    state.limiter.forget(&session_id);
    info!(session_id = %session_id, "User logged out");
    StatusCode::NO_CONTENT
}

pub async fn list_personas(State(state): State<Arc<AppState>>) -> Json<Vec<PersonaSummary>> {
    Json(
        state
            .config
            .personas
            .iter()
            .map(|p| p.summary())
            .collect(),
    )
}

#[derive(Debug, Deserialize)]
pub struct PersonaMessageRequest {
    pub content: String,
    /// Defaults to the persona's own setting.
    #[serde(default)]
    pub stream: Option<bool>,
}

/// One chat turn: SSE when streaming, JSON otherwise.
pub async fn persona_message(
    State(state): State<Arc<AppState>>,
    Extension(SessionId(session_id)): Extension<SessionId>,
    Path(name): Path<String>,
    Json(request): Json<PersonaMessageRequest>,
) -> Result<Response, ApiError> {
    let persona = state
        .persona(&name)
        .cloned()
        .ok_or_else(|| ApiError::not_found(format!("Unknown persona '{name}'"), "UNKNOWN_PERSONA"))?;

    if request.content.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Message content is empty",
            "EMPTY_MESSAGE",
        ));
    }

    let turn = chat::prepare_turn(&state, &session_id, &persona, &request.content).await?;
    let splitter = persona.splitter();

    if !request.stream.unwrap_or(persona.stream) {
        let reply = chat::complete_turn(&state, &session_id, splitter, turn).await?;
        return Ok(Json(reply).into_response());
    }

    let events = chat::stream_turn(state.clone(), session_id, splitter, turn).await?;
    let sse_events = events.map(|event| Ok::<_, Infallible>(sse_event(event)));

    Ok(Sse::new(sse_events)
        .keep_alive(KeepAlive::default())
        .into_response())
}

fn sse_event(event: TurnEvent) -> Event {
    match event {
        TurnEvent::Regions(regions) => json_event("regions", &regions),
        TurnEvent::Done(reply) => json_event("done", &serde_json::json!({ "content": reply.content })),
        TurnEvent::Failed(error) => json_event("error", &serde_json::json!({ "error": error })),
    }
}

fn json_event(name: &str, data: &impl Serialize) -> Event {
    match Event::default().event(name).json_data(data) {
        Ok(event) => event,
        Err(e) => Event::default().event("error").data(e.to_string()),
    }
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub persona: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub request_count: u32,
}

pub async fn get_transcript(
    State(state): State<Arc<AppState>>,
    Extension(SessionId(session_id)): Extension<SessionId>,
) -> Result<Json<TranscriptResponse>, ApiError> {
    let transcript = state
        .sessions
        .update(&session_id, |session| TranscriptResponse {
            persona: session.persona.clone(),
            messages: session.transcript().messages().to_vec(),
            request_count: session.request_count,
        })
        .await?;
    Ok(Json(transcript))
}

pub async fn clear_transcript(
    State(state): State<Arc<AppState>>,
    Extension(SessionId(session_id)): Extension<SessionId>,
) -> Result<StatusCode, ApiError> {
    state
        .sessions
        .update(&session_id, |session| session.clear_transcript())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub id: String,
}

/// Embed and store a journal entry.
pub async fn index_entry(
    State(state): State<Arc<AppState>>,
    Json(entry): Json<JournalEntry>,
) -> Result<(StatusCode, Json<IndexResponse>), ApiError> {
    let retriever = state.retriever.as_ref().ok_or_else(|| {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Journal retrieval is disabled on this server",
            "RETRIEVAL_DISABLED",
        )
    })?;

    if entry.title.trim().is_empty() && entry.content.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Journal entry needs a title or content",
            "EMPTY_ENTRY",
        ));
    }

    if !entry.has_valid_id() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Entry ID must be an unsigned integer or a UUID",
            "INVALID_ID",
        ));
    }

    let id = retriever.index(&entry).await?;
    Ok((StatusCode::CREATED, Json(IndexResponse { id })))
}

/// Generate one news edition.
pub async fn news(
    State(state): State<Arc<AppState>>,
    Extension(SessionId(session_id)): Extension<SessionId>,
) -> Result<Json<NewsEdition>, ApiError> {
    if !state.limiter.check_request(&session_id) {
        return Err(QuillError::RateLimited("news request limit reached".into()).into());
    }
    state
        .sessions
        .update(&session_id, |session| session.record_request())
        .await?;

    let edition = news::generate_edition(&state.config.news, state.llm.as_ref()).await?;
    Ok(Json(edition))
}
