//! Explicit per-session context.
//!
//! A [`Session`] is created by a successful login and torn down by logout
//! (or idle expiry in the session table). It owns the transcript and the
//! request counter; nothing here is shared between sessions.

use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::message::{ChatMessage, Transcript};

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    /// Unique session ID, also used as the bearer token.
    pub id: String,

    /// Authenticated user name.
    pub user: Option<String>,

    /// Login flag. Cleared on logout.
    pub logged_in: bool,

    /// Name of the persona the transcript belongs to.
    pub persona: Option<String>,

    /// System prompt the transcript was produced under.
    #[serde(skip)]
    system_prompt: Option<String>,

    transcript: Transcript,

    /// Number of requests made in this session.
    pub request_count: u32,

    /// Creation timestamp (Unix millis)
    pub created_at: u64,

    /// Last activity timestamp (Unix millis)
    pub last_active: u64,
}

impl Session {
    pub fn new() -> Self {
        let now = now_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user: None,
            logged_in: false,
            persona: None,
            system_prompt: None,
            transcript: Transcript::new(),
            request_count: 0,
            created_at: now,
            last_active: now,
        }
    }

    /// Create a session that is already logged in as `user`.
    pub fn logged_in(user: impl Into<String>) -> Self {
        let mut session = Self::new();
        session.login(user);
        session
    }

    pub fn login(&mut self, user: impl Into<String>) {
        self.user = Some(user.into());
        self.logged_in = true;
        self.touch();
    }

    /// Tear the session down: clears login state, persona and transcript.
    pub fn logout(&mut self) {
        self.user = None;
        self.logged_in = false;
        self.persona = None;
        self.system_prompt = None;
        self.transcript.clear();
        self.request_count = 0;
    }

    /// Switch to a persona. Returns `true` if the transcript was discarded
    /// because the persona name or its prompt text changed.
    pub fn select_persona(&mut self, name: &str, system_prompt: &str) -> bool {
        let unchanged = self.persona.as_deref() == Some(name)
            && self.system_prompt.as_deref() == Some(system_prompt);
        if unchanged {
            return false;
        }

        let had_history = !self.transcript.is_empty();
        self.transcript.clear();
        self.persona = Some(name.to_string());
        self.system_prompt = Some(system_prompt.to_string());
        had_history
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.transcript.push(ChatMessage::user(content));
        self.touch();
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.transcript.push(ChatMessage::assistant(content));
        self.touch();
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn clear_transcript(&mut self) {
        self.transcript.clear();
    }

    /// Count one request and return the new total.
    pub fn record_request(&mut self) -> u32 {
        self.request_count = self.request_count.saturating_add(1);
        self.touch();
        self.request_count
    }

    /// System prompt followed by the transcript, ready for a completion call.
    pub fn messages_for_completion(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.transcript.len() + 1);
        if let Some(ref prompt) = self.system_prompt {
            messages.push(ChatMessage::system(prompt.clone()));
        }
        messages.extend(self.transcript.messages().iter().cloned());
        messages
    }

    /// Milliseconds since the last activity.
    pub fn idle_millis(&self) -> u64 {
        now_millis().saturating_sub(self.last_active)
    }

    /// Mark the session as active now.
    pub fn touch(&mut self) {
        self.last_active = now_millis();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
