use async_trait::async_trait;
use futures::stream::BoxStream;
use quill_common::{ChatMessage, Result};
use serde::{Deserialize, Serialize};

/// Text fragments of a streamed completion, in arrival order.
///
/// Finite and not restartable; an `Err` item ends the useful part of the stream.
pub type FragmentStream = BoxStream<'static, Result<String>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmRequest {
    /// Overrides the client's default model when set.
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Empty when the service returned no choices.
    pub content: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<String>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run a completion and wait for the whole text.
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse>;

    /// Run a completion and yield text fragments as they arrive.
    async fn stream(&self, request: LlmRequest) -> Result<FragmentStream>;

    fn model_name(&self) -> &str;
}

#[async_trait]
impl LlmClient for Box<dyn LlmClient> {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        (**self).complete(request).await
    }
    async fn stream(&self, request: LlmRequest) -> Result<FragmentStream> {
        (**self).stream(request).await
    }
    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}
