//! Text embedding through an OpenAI-compatible `/v1/embeddings` endpoint.

use async_trait::async_trait;
use quill_common::{QuillError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::types::EmbeddingConfig;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one text into a vector of [`Embedder::dimension`] floats.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn dimension(&self) -> usize;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    base_url: String,
    model: String,
    api_key: Option<String>,
    dimension: usize,
    http_client: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        if config.dimension == 0 {
            return Err(QuillError::Config(
                "Embedding dimension must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            base_url: config
                .api_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            dimension: config.dimension,
            http_client: reqwest::Client::new(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = EmbeddingRequest {
            model: &self.model,
            input: text,
        };

        let mut http_req = self.http_client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            http_req = http_req.bearer_auth(key);
        }

        let response = http_req
            .send()
            .await
            .map_err(|e| QuillError::Embedding(format!("Embedding request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(QuillError::Embedding(format!(
                "Embedding API error {status}: {body_text}"
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| QuillError::Embedding(format!("Failed to parse embedding response: {e}")))?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| QuillError::Embedding("Empty embedding result".into()))?;

        if embedding.len() != self.dimension {
            return Err(QuillError::Embedding(format!(
                "Dimension mismatch: model '{}' returned {}-dim vector but config specifies {}",
                self.model,
                embedding.len(),
                self.dimension
            )));
        }

        debug!(dimension = embedding.len(), "Generated embedding");
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
