//! Vector storage backed by Qdrant's REST API.
//!
//! Indexing and similarity search happen entirely inside the service; this
//! module only marshals points in and payloads out.

use async_trait::async_trait;
use quill_common::{QuillError, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use crate::types::{PayloadRecord, ScoredRecord, VectorStoreConfig};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if it does not exist yet.
    async fn ensure_collection(&self, dimension: usize) -> Result<()>;

    async fn upsert(&self, id: &str, vector: Vec<f32>, payload: &PayloadRecord) -> Result<()>;

    /// Nearest neighbours of `vector`, best match first.
    async fn query(&self, vector: Vec<f32>, limit: usize, with_payload: bool)
        -> Result<Vec<ScoredRecord>>;
}

#[derive(Serialize)]
struct SearchRequest {
    vector: Vec<f32>,
    limit: usize,
    with_payload: bool,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<serde_json::Map<String, Value>>,
}

pub struct QdrantStore {
    base_url: String,
    collection: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl QdrantStore {
    pub fn new(config: &VectorStoreConfig) -> Self {
        Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            api_key: config.api_key.clone(),
            http_client: reqwest::Client::new(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.http_client.request(method, url);
        match self.api_key {
            Some(ref key) => builder.header("api-key", key),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder, action: &str) -> Result<reqwest::Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| QuillError::VectorStore(format!("{action} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(QuillError::VectorStore(format!(
                "{action} failed with {status}: {body_text}"
            )));
        }
        Ok(response)
    }

    /// Qdrant accepts unsigned integers or UUIDs as point IDs.
    fn point_id(id: &str) -> Value {
        match id.parse::<u64>() {
            Ok(n) => json!(n),
            Err(_) => json!(id),
        }
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    #[instrument(skip(self), fields(collection = %self.collection))]
    async fn ensure_collection(&self, dimension: usize) -> Result<()> {
        let url = self.collection_url();
        let existing = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(|e| QuillError::VectorStore(format!("Collection lookup failed: {e}")))?;

        match existing.status() {
            status if status.is_success() => {
                debug!("Collection already exists");
                return Ok(());
            }
            StatusCode::NOT_FOUND => {}
            status => {
                let body_text = existing.text().await.unwrap_or_default();
                return Err(QuillError::VectorStore(format!(
                    "Collection lookup failed with {status}: {body_text}"
                )));
            }
        }

        let body = json!({"vectors": {"size": dimension, "distance": "Cosine"}});
        self.send(
            self.request(reqwest::Method::PUT, &url).json(&body),
            "Create collection",
        )
        .await?;

        info!(dimension, "Created vector collection");
        Ok(())
    }

    #[instrument(skip(self, vector, payload), fields(collection = %self.collection))]
    async fn upsert(&self, id: &str, vector: Vec<f32>, payload: &PayloadRecord) -> Result<()> {
        let url = format!("{}/points?wait=true", self.collection_url());
        let body = json!({
            "points": [{
                "id": Self::point_id(id),
                "vector": vector,
                "payload": payload,
            }]
        });

        self.send(self.request(reqwest::Method::PUT, &url).json(&body), "Upsert")
            .await?;

        debug!("Upserted point");
        Ok(())
    }

    #[instrument(skip(self, vector), fields(collection = %self.collection))]
    async fn query(
        &self,
        vector: Vec<f32>,
        limit: usize,
        with_payload: bool,
    ) -> Result<Vec<ScoredRecord>> {
        let url = format!("{}/points/search", self.collection_url());
        let body = SearchRequest {
            vector,
            limit,
            with_payload,
        };

        let response = self
            .send(self.request(reqwest::Method::POST, &url).json(&body), "Search")
            .await?;

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| QuillError::VectorStore(format!("Failed to parse search response: {e}")))?;

        let hits: Vec<ScoredRecord> = parsed
            .result
            .into_iter()
            .map(|hit| ScoredRecord {
                id: match hit.id {
                    Value::String(s) => s,
                    other => other.to_string(),
                },
                score: hit.score,
                payload: hit.payload.map(PayloadRecord::from_json).unwrap_or_default(),
            })
            .collect();

        debug!(hits = hits.len(), "Search finished");
        Ok(hits)
    }
}
