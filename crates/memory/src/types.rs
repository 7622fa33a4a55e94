//! Record types and configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const TITLE_KEY: &str = "title";
pub const TIMESTAMP_KEY: &str = "timestamp";
pub const CONTENT_KEY: &str = "content";

/// Flat string map stored alongside a vector. Opaque to Quill apart from
/// the well-known keys used when formatting prompts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadRecord(pub BTreeMap<String, String>);

impl PayloadRecord {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn title(&self) -> &str {
        self.get(TITLE_KEY).unwrap_or_default()
    }

    pub fn timestamp(&self) -> &str {
        self.get(TIMESTAMP_KEY).unwrap_or_default()
    }

    pub fn content(&self) -> &str {
        self.get(CONTENT_KEY).unwrap_or_default()
    }

    /// Flatten a JSON object; non-string values keep their JSON text.
    pub fn from_json(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(
            map.into_iter()
                .map(|(key, value)| {
                    let text = match value {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (key, text)
                })
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PayloadRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A nearest-neighbour match as returned by the vector store.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredRecord {
    pub id: String,
    pub score: f32,
    pub payload: PayloadRecord,
}

/// A journal entry to be embedded and stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Point ID; a UUIDv4 is generated when absent.
    #[serde(default)]
    pub id: Option<String>,

    pub title: String,

    #[serde(default)]
    pub timestamp: Option<String>,

    pub content: String,
}

impl JournalEntry {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            timestamp: None,
            content: content.into(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Whether the supplied ID is usable as a point ID. The vector store
    /// only accepts unsigned integers and UUIDs; an absent ID is fine.
    pub fn has_valid_id(&self) -> bool {
        match self.id.as_deref() {
            None => true,
            Some(id) => id.parse::<u64>().is_ok() || uuid::Uuid::parse_str(id).is_ok(),
        }
    }

    /// Text submitted to the embedding service.
    pub fn embedding_text(&self) -> String {
        format!("{}\n{}", self.title, self.content)
    }

    pub fn payload(&self) -> PayloadRecord {
        let mut map = BTreeMap::new();
        map.insert(TITLE_KEY.to_string(), self.title.clone());
        map.insert(CONTENT_KEY.to_string(), self.content.clone());
        if let Some(ref ts) = self.timestamp {
            map.insert(TIMESTAMP_KEY.to_string(), ts.clone());
        }
        PayloadRecord(map)
    }
}

/// Configuration for the embedding service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Expected vector length; responses of any other length are rejected.
    #[serde(default = "default_embedding_dim")]
    pub dimension: usize,

    pub api_url: Option<String>,

    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

fn default_embedding_model() -> String {
    "text-embedding-ada-002".into()
}

fn default_embedding_dim() -> usize {
    1536
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimension: default_embedding_dim(),
            api_url: None,
            api_key: None,
        }
    }
}

/// Configuration for the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default = "default_store_url")]
    pub url: String,

    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_collection")]
    pub collection: String,

    /// Number of records returned per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_store_url() -> String {
    "http://localhost:6333".into()
}

fn default_collection() -> String {
    "journal".into()
}

fn default_top_k() -> usize {
    3
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            api_key: None,
            collection: default_collection(),
            top_k: default_top_k(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_ids_must_be_integers_or_uuids() {
        assert!(JournalEntry::new("t", "c").has_valid_id());
        assert!(JournalEntry::new("t", "c").with_id("99").has_valid_id());
        assert!(
            JournalEntry::new("t", "c")
                .with_id("7f1c4c8e-9b0a-4c55-8d0a-2b1f0e6f3c11")
                .has_valid_id()
        );
        assert!(!JournalEntry::new("t", "c").with_id("entry-one").has_valid_id());
        assert!(!JournalEntry::new("t", "c").with_id("-3").has_valid_id());
        assert!(!JournalEntry::new("t", "c").with_id("").has_valid_id());
    }

    #[test]
    fn payload_from_json_flattens_values() {
        let map = json!({"title": "Walk", "mood": 7, "tags": ["a"]})
            .as_object()
            .cloned()
            .unwrap();
        let record = PayloadRecord::from_json(map);
        assert_eq!(record.title(), "Walk");
        assert_eq!(record.get("mood"), Some("7"));
        assert_eq!(record.get("tags"), Some("[\"a\"]"));
        assert_eq!(record.content(), "");
    }

    #[test]
    fn journal_entry_payload() {
        let entry = JournalEntry::new("Sunday", "Went hiking.").with_timestamp("2025-01-05");
        let payload = entry.payload();
        assert_eq!(payload.title(), "Sunday");
        assert_eq!(payload.timestamp(), "2025-01-05");
        assert_eq!(payload.content(), "Went hiking.");
        assert_eq!(entry.embedding_text(), "Sunday\nWent hiking.");
    }

    #[test]
    fn journal_entry_payload_without_timestamp() {
        let payload = JournalEntry::new("t", "c").payload();
        assert!(payload.get(TIMESTAMP_KEY).is_none());
    }

    #[test]
    fn config_defaults_from_empty_toml() {
        let embedding: EmbeddingConfig = toml::from_str("").unwrap();
        assert_eq!(embedding.dimension, 1536);
        assert_eq!(embedding.model, "text-embedding-ada-002");

        let store: VectorStoreConfig = toml::from_str("collection = \"notes\"").unwrap();
        assert_eq!(store.collection, "notes");
        assert_eq!(store.url, "http://localhost:6333");
        assert_eq!(store.top_k, 3);
    }
}
