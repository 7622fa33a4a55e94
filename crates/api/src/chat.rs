//! One chat turn against a persona.
//!
//! ```text
//! select persona ─► count request ─► retrieve (optional)
//!        ─► complete | stream through the splitter ─► push user + assistant
//! ```
//!
//! The user message joins the transcript only together with its reply, so
//! a failed turn leaves the transcript as it was.

use futures::stream::{self, BoxStream, StreamExt};
use quill_common::{ChatMessage, QuillError, Result};
use quill_llm::{LlmRequest, RegionSnapshot, SplitOutcome, StreamSplitter, consume_stream};
use quill_memory::prompt;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::persona::PersonaConfig;
use crate::state::AppState;

/// Final answer of a turn, with its display regions.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TurnReply {
    pub content: String,
    pub primary: String,
    pub secondary: String,
}

impl From<SplitOutcome> for TurnReply {
    fn from(outcome: SplitOutcome) -> Self {
        Self {
            content: outcome.full,
            primary: outcome.primary,
            secondary: outcome.secondary,
        }
    }
}

/// Progress of a streamed turn.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// Regions after the latest fragment.
    Regions(RegionSnapshot),
    Done(TurnReply),
    Failed(String),
}

/// A turn ready to send upstream.
#[derive(Debug, Clone)]
pub struct PreparedTurn {
    pub request: LlmRequest,
    /// User message recorded once the reply arrives.
    pub user_content: String,
}

/// Count the request and build the prompt for this turn.
pub async fn prepare_turn(
    state: &AppState,
    session_id: &str,
    persona: &PersonaConfig,
    question: &str,
) -> Result<PreparedTurn> {
    if !state.limiter.check_request(session_id) {
        let limits = state.limiter.config();
        return Err(QuillError::RateLimited(format!(
            "at most {} requests per {}s",
            limits.max_requests,
            limits.window.as_secs()
        )));
    }

    let (discarded, count) = state
        .sessions
        .update(session_id, |session| {
            let discarded = session.select_persona(&persona.name, &persona.system_prompt);
            (discarded, session.record_request())
        })
        .await?;

    if discarded {
        debug!(persona = %persona.name, "Persona changed, transcript cleared");
    }

    info!(
        persona = %persona.name,
        request_count = count,
        question_preview = %question.chars().take(50).collect::<String>(),
        "Chat turn"
    );

    let user_content = if persona.retrieval {
        let records = match state.retriever {
            Some(ref retriever) => retriever.retrieve_or_empty(question, persona.top_k).await,
            None => {
                warn!(persona = %persona.name, "Retrieval requested but no vector store configured");
                Vec::new()
            }
        };
        let context = prompt::build_context(&records, &persona.empty_context);
        prompt::user_prompt(&context, question)
    } else {
        question.to_string()
    };

    let mut messages = state
        .sessions
        .update(session_id, |session| session.messages_for_completion())
        .await?;
    messages.push(ChatMessage::user(user_content.clone()));

    Ok(PreparedTurn {
        request: LlmRequest::new(messages).with_model(persona.model.clone()),
        user_content,
    })
}

/// Run a prepared turn to completion without streaming.
pub async fn complete_turn(
    state: &AppState,
    session_id: &str,
    mut splitter: StreamSplitter,
    turn: PreparedTurn,
) -> Result<TurnReply> {
    let response = state.llm.complete(turn.request).await?;
    splitter.push(&response.content);
    let outcome = splitter.finish();

    record_exchange(state, session_id, turn.user_content, &outcome.full).await;
    Ok(outcome.into())
}

/// Run a prepared turn as a stream of [`TurnEvent`]s.
///
/// Fragments are consumed on a spawned task, so the exchange is recorded
/// even if the caller stops listening. A failure before the first fragment
/// is returned directly; later failures arrive as [`TurnEvent::Failed`] and
/// record nothing.
pub async fn stream_turn(
    state: Arc<AppState>,
    session_id: String,
    splitter: StreamSplitter,
    turn: PreparedTurn,
) -> Result<BoxStream<'static, TurnEvent>> {
    let PreparedTurn {
        request,
        user_content,
    } = turn;
    let fragments = state.llm.stream(request).await?;
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let result = consume_stream(fragments, splitter, |regions| {
            let _ = tx.send(TurnEvent::Regions(regions.to_snapshot()));
        })
        .await;

        match result {
            Ok(outcome) => {
                record_exchange(&state, &session_id, user_content, &outcome.full).await;
                let _ = tx.send(TurnEvent::Done(outcome.into()));
            }
            Err(e) => {
                warn!(error = %e, "Completion stream failed");
                let _ = tx.send(TurnEvent::Failed(e.to_string()));
            }
        }
    });

    Ok(stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|event| (event, rx)) }).boxed())
}

async fn record_exchange(
    state: &AppState,
    session_id: &str,
    user_content: String,
    reply: &str,
) {
    let pushed = state
        .sessions
        .update(session_id, |session| {
            session.push_user(user_content);
            session.push_assistant(reply);
        })
        .await;
    if pushed.is_err() {
        warn!(session_id = %session_id, "Session ended before the reply was recorded");
    }
}
