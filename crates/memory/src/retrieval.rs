//! Embed-then-search retrieval and indexing.

use quill_common::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::embedding::Embedder;
use crate::store::VectorStore;
use crate::types::{JournalEntry, PayloadRecord};

/// Retrieves payload records relevant to a query.
///
/// Ranking is whatever the vector store returns; nothing is re-ordered or
/// filtered here.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    top_k: usize,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, top_k: usize) -> Self {
        Self {
            embedder,
            store,
            top_k,
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Create the backing collection if needed.
    pub async fn prepare(&self) -> Result<()> {
        self.store.ensure_collection(self.embedder.dimension()).await
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<PayloadRecord>> {
        self.retrieve_top(query, self.top_k).await
    }

    pub async fn retrieve_top(&self, query: &str, top_k: usize) -> Result<Vec<PayloadRecord>> {
        debug!(query_len = query.len(), top_k, "Retrieving records");

        let vector = self.embedder.embed(query).await?;
        let hits = self.store.query(vector, top_k, true).await?;

        debug!(hits = hits.len(), "Retrieved records");
        Ok(hits.into_iter().map(|hit| hit.payload).collect())
    }

    /// Like [`Retriever::retrieve_top`], but a failure is logged and treated
    /// as "nothing found" so the chat turn can continue.
    pub async fn retrieve_or_empty(&self, query: &str, top_k: usize) -> Vec<PayloadRecord> {
        match self.retrieve_top(query, top_k).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Retrieval failed, continuing without context");
                Vec::new()
            }
        }
    }

    /// Embed and store a journal entry. Returns the point ID used.
    pub async fn index(&self, entry: &JournalEntry) -> Result<String> {
        let id = entry
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let vector = self.embedder.embed(&entry.embedding_text()).await?;
        self.store.upsert(&id, vector, &entry.payload()).await?;

        info!(id = %id, title = %entry.title, "Indexed journal entry");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScoredRecord;
    use async_trait::async_trait;
    use quill_common::QuillError;
    use std::sync::Mutex;

    struct FixedEmbedder {
        fail: bool,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if self.fail {
                return Err(QuillError::Embedding("service down".into()));
            }
            Ok(vec![text.len() as f32, 1.0])
        }
        fn dimension(&self) -> usize {
            2
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        upserts: Mutex<Vec<(String, Vec<f32>, PayloadRecord)>>,
        queries: Mutex<Vec<(Vec<f32>, usize, bool)>>,
        collection_dim: Mutex<Option<usize>>,
    }

    #[async_trait]
    impl VectorStore for RecordingStore {
        async fn ensure_collection(&self, dimension: usize) -> Result<()> {
            *self.collection_dim.lock().unwrap() = Some(dimension);
            Ok(())
        }

        async fn upsert(&self, id: &str, vector: Vec<f32>, payload: &PayloadRecord) -> Result<()> {
            self.upserts
                .lock()
                .unwrap()
                .push((id.to_string(), vector, payload.clone()));
            Ok(())
        }

        async fn query(
            &self,
            vector: Vec<f32>,
            limit: usize,
            with_payload: bool,
        ) -> Result<Vec<ScoredRecord>> {
            self.queries.lock().unwrap().push((vector, limit, with_payload));
            Ok(vec![
                ScoredRecord {
                    id: "2".into(),
                    score: 0.4,
                    payload: [("title", "second")].into_iter().collect(),
                },
                ScoredRecord {
                    id: "1".into(),
                    score: 0.9,
                    payload: [("title", "first")].into_iter().collect(),
                },
            ])
        }
    }

    fn retriever(fail: bool) -> (Retriever, Arc<RecordingStore>) {
        let store = Arc::new(RecordingStore::default());
        let retriever = Retriever::new(Arc::new(FixedEmbedder { fail }), store.clone(), 3);
        (retriever, store)
    }

    #[tokio::test]
    async fn retrieve_keeps_store_order() {
        let (retriever, store) = retriever(false);
        let records = retriever.retrieve("walks").await.unwrap();

        let titles: Vec<&str> = records.iter().map(|r| r.title()).collect();
        assert_eq!(titles, vec!["second", "first"]);

        let queries = store.queries.lock().unwrap();
        assert_eq!(queries[0], (vec![5.0, 1.0], 3, true));
    }

    #[tokio::test]
    async fn retrieve_propagates_errors() {
        let (retriever, _) = retriever(true);
        assert!(retriever.retrieve("walks").await.is_err());
    }

    #[tokio::test]
    async fn retrieve_or_empty_swallows_errors() {
        let (retriever, store) = retriever(true);
        assert!(retriever.retrieve_or_empty("walks", 5).await.is_empty());
        assert!(store.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn index_generates_id_and_payload() {
        let (retriever, store) = retriever(false);
        let entry = JournalEntry::new("Sunday", "Hiked.").with_timestamp("2025-01-05");

        let id = retriever.index(&entry).await.unwrap();
        assert!(uuid::Uuid::parse_str(&id).is_ok());

        let upserts = store.upserts.lock().unwrap();
        let (stored_id, vector, payload) = &upserts[0];
        assert_eq!(stored_id, &id);
        assert_eq!(vector, &vec!["Sunday\nHiked.".len() as f32, 1.0]);
        assert_eq!(payload.timestamp(), "2025-01-05");
    }

    #[tokio::test]
    async fn index_keeps_supplied_id() {
        let (retriever, _) = retriever(false);
        let entry = JournalEntry::new("t", "c").with_id("99");
        assert_eq!(retriever.index(&entry).await.unwrap(), "99");
    }

    #[tokio::test]
    async fn prepare_uses_embedder_dimension() {
        let (retriever, store) = retriever(false);
        retriever.prepare().await.unwrap();
        assert_eq!(*store.collection_dim.lock().unwrap(), Some(2));
    }
}
