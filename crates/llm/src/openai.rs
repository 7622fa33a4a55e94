use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use quill_common::{ChatMessage, QuillError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use reqwest_eventsource::{Event, EventSource, retry::Never};

use crate::client::{FragmentStream, LlmClient, LlmRequest, LlmResponse, TokenUsage};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Data of the final event in a streamed completion.
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct OpenAiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    model: String,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAiChunk {
    #[serde(default)]
    choices: Vec<OpenAiChunkChoice>,
}

#[derive(Deserialize)]
struct OpenAiChunkChoice {
    #[serde(default)]
    delta: OpenAiDelta,
}

#[derive(Deserialize, Default)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Client for OpenAI-compatible `/v1/chat/completions` endpoints.
pub struct OpenAiClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    http_client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(base_url: Option<String>, model: String, api_key: Option<String>) -> Result<Self> {
        Self::with_connect_timeout(base_url, model, api_key, Duration::from_secs(10))
    }

    pub fn with_connect_timeout(
        base_url: Option<String>,
        model: String,
        api_key: Option<String>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| QuillError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model,
            api_key,
            temperature: None,
            max_tokens: None,
            http_client,
        })
    }

    /// Defaults applied when a request does not set its own.
    pub fn with_sampling(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    fn build_messages(messages: &[ChatMessage]) -> Vec<OpenAiMessage<'_>> {
        messages
            .iter()
            .map(|msg| OpenAiMessage {
                role: msg.role.as_str(),
                content: &msg.content,
            })
            .collect()
    }

    fn build_request_body<'a>(&'a self, request: &'a LlmRequest, stream: bool) -> OpenAiRequest<'a> {
        OpenAiRequest {
            model: request.model.as_deref().unwrap_or(&self.model),
            messages: Self::build_messages(&request.messages),
            temperature: request.temperature.or(self.temperature),
            max_tokens: request.max_tokens.or(self.max_tokens),
            stream,
        }
    }

    fn request_builder(&self, request: &LlmRequest, stream: bool) -> reqwest::RequestBuilder {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_request_body(request, stream);

        let http_req = self.http_client.post(&url).json(&body);
        match self.api_key {
            Some(ref key) => http_req.bearer_auth(key),
            None => http_req,
        }
    }

    async fn send(&self, request: &LlmRequest) -> Result<reqwest::Response> {
        let response = self
            .request_builder(request, false)
            .send()
            .await
            .map_err(|e| QuillError::Llm(format!("Completion request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(QuillError::Llm(format!(
                "Completion API error {status}: {body_text}"
            )));
        }

        Ok(response)
    }
}

/// Text carried by one streamed chunk. Role-only and empty deltas carry none.
fn chunk_content(data: &str) -> Result<Option<String>> {
    if data.trim().is_empty() {
        return Ok(None);
    }
    let chunk: OpenAiChunk = serde_json::from_str(data)
        .map_err(|e| QuillError::Llm(format!("Malformed stream chunk: {e}")))?;

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

async fn stream_error(error: reqwest_eventsource::Error) -> QuillError {
    match error {
        reqwest_eventsource::Error::InvalidStatusCode(status, response) => {
            let body_text = response.text().await.unwrap_or_default();
            QuillError::Llm(format!("Completion API error {status}: {body_text}"))
        }
        other => QuillError::Llm(format!("Stream error: {other}")),
    }
}

/// Fragments of an opened event source, ending at `[DONE]`, at the end of
/// the body, or after the first error.
fn fragments(events: EventSource) -> FragmentStream {
    stream::unfold(Some(events), |events| async move {
        let mut events = events?;
        loop {
            match events.next().await {
                Some(Ok(Event::Open)) => continue,
                Some(Ok(Event::Message(message))) => {
                    if message.data == DONE_SENTINEL {
                        events.close();
                        return None;
                    }
                    match chunk_content(&message.data) {
                        Ok(Some(text)) => return Some((Ok(text), Some(events))),
                        Ok(None) => continue,
                        Err(e) => {
                            events.close();
                            return Some((Err(e), None));
                        }
                    }
                }
                Some(Err(reqwest_eventsource::Error::StreamEnded)) | None => return None,
                Some(Err(e)) => {
                    events.close();
                    return Some((Err(stream_error(e).await), None));
                }
            }
        }
    })
    .boxed()
}

#[async_trait]
impl LlmClient for OpenAiClient {
    #[instrument(skip(self, request), fields(messages = request.messages.len()))]
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let response = self.send(&request).await?;

        let oai_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| QuillError::Llm(format!("Failed to parse completion response: {e}")))?;

        let usage = oai_response.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        });

        let Some(choice) = oai_response.choices.into_iter().next() else {
            warn!(model = %oai_response.model, "Completion returned no choices");
            return Ok(LlmResponse {
                content: String::new(),
                model: oai_response.model,
                usage,
                finish_reason: None,
            });
        };

        debug!(
            model = %oai_response.model,
            finish_reason = ?choice.finish_reason,
            "Completion finished"
        );

        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            model: oai_response.model,
            usage,
            finish_reason: choice.finish_reason,
        })
    }

    #[instrument(skip(self, request), fields(messages = request.messages.len()))]
    async fn stream(&self, request: LlmRequest) -> Result<FragmentStream> {
        let mut events = EventSource::new(self.request_builder(&request, true))
            .map_err(|e| QuillError::Llm(format!("Cannot open completion stream: {e}")))?;
        // One attempt per turn; a dropped stream is reported, not resumed.
        events.set_retry_policy(Box::new(Never));

        match events.next().await {
            Some(Ok(Event::Open)) => debug!("Completion stream opened"),
            Some(Err(e)) => return Err(stream_error(e).await),
            _ => {
                return Err(QuillError::Llm(
                    "Completion stream closed before opening".into(),
                ));
            }
        }

        Ok(fragments(events))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
