//! Application state for the API server.

use quill_common::{QuillError, Result, Session};
use quill_llm::{LlmClient, build_llm_client};
use quill_memory::{OpenAiEmbedder, QdrantStore, Retriever};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::auth::LoginGate;
use crate::config::AppConfig;
use crate::persona::PersonaConfig;
use crate::rate_limit::RateLimiter;

/// Live sessions keyed by session ID.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Create a logged-in session and return a copy of it.
    pub async fn create(&self, user: &str) -> Session {
        let session = Session::logged_in(user);
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        session
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Whether `id` names a live, logged-in session, refreshing its activity
    /// time. Expired sessions are removed on the way.
    pub async fn touch(&self, id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let expired = match sessions.get(id) {
            Some(session) if session.logged_in => self.is_expired(session),
            _ => return false,
        };
        if expired {
            debug!(session_id = %id, "Session expired");
            sessions.remove(id);
            return false;
        }
        if let Some(session) = sessions.get_mut(id) {
            session.touch();
        }
        true
    }

    /// Run `f` against the session, or fail with a session error.
    pub async fn update<R>(&self, id: &str, f: impl FnOnce(&mut Session) -> R) -> Result<R> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| QuillError::Session(format!("Session {id} not found")))?;
        Ok(f(session))
    }

    /// Log the session out and drop it.
    pub async fn remove(&self, id: &str) -> Option<Session> {
        let mut session = self.sessions.write().await.remove(id)?;
        session.logout();
        Some(session)
    }

    /// Drop every idle session. Returns the IDs removed.
    pub async fn purge_idle(&self) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<String> = sessions
            .values()
            .filter(|s| self.is_expired(s))
            .map(|s| s.id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        expired
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn is_expired(&self, session: &Session) -> bool {
        session.idle_millis() > self.idle_timeout.as_millis() as u64
    }
}

/// Shared application state for the API server.
pub struct AppState {
    pub config: AppConfig,

    pub llm: Arc<dyn LlmClient>,

    /// `None` when running without a vector store.
    pub retriever: Option<Arc<Retriever>>,

    pub login: LoginGate,

    pub sessions: SessionStore,

    pub limiter: RateLimiter,

    /// Server start time (for health checks)
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Build state from already constructed clients.
    pub fn with_components(
        config: AppConfig,
        llm: Arc<dyn LlmClient>,
        retriever: Option<Arc<Retriever>>,
    ) -> Self {
        Self {
            login: LoginGate::from_config(&config.auth),
            sessions: SessionStore::new(Duration::from_secs(config.server.session_idle_secs)),
            limiter: RateLimiter::new(config.rate_limit.to_limiter_config()),
            llm,
            retriever,
            config,
            start_time: std::time::Instant::now(),
        }
    }

    /// Build the LLM client and, if `retrieval` is set, the retriever.
    ///
    /// The vector collection is created here when missing.
    pub async fn from_config(config: AppConfig, retrieval: bool) -> Result<Self> {
        let llm = build_llm_client(&config.llm)?;

        let retriever = if retrieval {
            let embedder = OpenAiEmbedder::new(&config.embedding)?;
            let store = QdrantStore::new(&config.vector_store);
            let retriever = Retriever::new(
                Arc::new(embedder),
                Arc::new(store),
                config.vector_store.top_k,
            );
            retriever.prepare().await?;
            info!(
                collection = %config.vector_store.collection,
                "Journal retrieval enabled"
            );
            Some(Arc::new(retriever))
        } else {
            info!("Journal retrieval disabled");
            None
        };

        Ok(Self::with_components(config, llm, retriever))
    }

    pub fn persona(&self, name: &str) -> Option<&PersonaConfig> {
        self.config.persona(name)
    }

    /// Get the uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
