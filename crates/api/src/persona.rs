//! Persona definitions.
//!
//! A persona bundles a system prompt with the knobs that decide how a chat
//! turn runs: which model, whether journal retrieval happens, and which
//! marker splits the streamed answer into two display regions.

use quill_llm::StreamSplitter;
use quill_memory::prompt::DEFAULT_EMPTY_CONTEXT;
use serde::{Deserialize, Serialize};

pub const JOY_MARKER: &str = "👱‍♀️ **Joy**:";

const JOY_SYSTEM_PROMPT: &str = "You are **Joy**, a compassionate and insightful journaling companion. \n\
Your primary role is to retrieve relevant journal entries and present them verbatim.\n\
After each entry, include a short reflection.\n\
Use this format:\n\
- **Journal Entry:** 📖 [Title] followed by the entry.\n\
- **Reflection:** 👱‍♀️ **Joy**: followed by your insights.\n\
If no relevant journal entry exists, respond with: \"I don’t find anything about that in your Journal.\"";

const ASSISTANT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    pub name: String,

    #[serde(default)]
    pub avatar: String,

    #[serde(default = "default_language")]
    pub language: String,

    pub system_prompt: String,

    /// Overrides the configured LLM model for this persona.
    #[serde(default)]
    pub model: Option<String>,

    /// Text that separates the primary and secondary display regions.
    #[serde(default)]
    pub marker: Option<String>,

    #[serde(default)]
    pub retrieval: bool,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Context handed to the model when retrieval finds nothing.
    #[serde(default = "default_empty_context")]
    pub empty_context: String,

    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_language() -> String {
    "en".into()
}

fn default_top_k() -> usize {
    3
}

fn default_empty_context() -> String {
    DEFAULT_EMPTY_CONTEXT.into()
}

fn default_stream() -> bool {
    true
}

impl PersonaConfig {
    /// The journaling companion.
    pub fn joy() -> Self {
        Self {
            name: "joy".into(),
            avatar: "👱‍♀️".into(),
            language: default_language(),
            system_prompt: JOY_SYSTEM_PROMPT.into(),
            model: Some("gpt-4o-mini".into()),
            marker: Some(JOY_MARKER.into()),
            retrieval: true,
            top_k: default_top_k(),
            empty_context: default_empty_context(),
            stream: true,
        }
    }

    /// A plain assistant without retrieval or region splitting.
    pub fn assistant() -> Self {
        Self {
            name: "chat".into(),
            avatar: "🤖".into(),
            language: default_language(),
            system_prompt: ASSISTANT_SYSTEM_PROMPT.into(),
            model: None,
            marker: None,
            retrieval: false,
            top_k: default_top_k(),
            empty_context: default_empty_context(),
            stream: true,
        }
    }

    pub fn splitter(&self) -> StreamSplitter {
        match self.marker {
            Some(ref marker) => StreamSplitter::new(marker.clone()),
            None => StreamSplitter::unmarked(),
        }
    }

    pub fn summary(&self) -> PersonaSummary {
        PersonaSummary {
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            language: self.language.clone(),
            stream: self.stream,
            retrieval: self.retrieval,
        }
    }
}

pub fn default_personas() -> Vec<PersonaConfig> {
    vec![PersonaConfig::joy(), PersonaConfig::assistant()]
}

/// Public view of a persona; the system prompt stays server-side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersonaSummary {
    pub name: String,
    pub avatar: String,
    pub language: String,
    pub stream: bool,
    pub retrieval: bool,
}
