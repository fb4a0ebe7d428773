//! In-process vector store with brute-force cosine search

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::{Error, Result};

use super::embedding::EmbeddingProvider;
use super::vector_store::{AddDocuments, QueryMatch, VectorStore};

#[derive(Debug, Clone)]
struct StoredDocument {
    text: String,
    metadata: Map<String, Value>,
    vector: Vec<f32>,
}

/// In-process vector store keyed by collection name.
///
/// Embeds texts through the injected provider when vectors are not supplied,
/// mirroring the remote store's behavior.
pub struct MemoryVectorStore {
    collections: DashMap<String, Arc<DashMap<String, StoredDocument>>>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl MemoryVectorStore {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            collections: DashMap::new(),
            embedder,
        }
    }

    fn collection(&self, name: &str) -> Result<Arc<DashMap<String, StoredDocument>>> {
        self.collections
            .get(name)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| Error::VectorStore(format!("collection '{}' does not exist", name)))
    }

    fn matches_filter(metadata: &Map<String, Value>, filter: Option<&Map<String, Value>>) -> bool {
        match filter {
            None => true,
            Some(filter) => filter
                .iter()
                .all(|(key, expected)| metadata.get(key) == Some(expected)),
        }
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return f32::MAX;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return f32::MAX;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn ensure_collection(&self, name: &str) -> Result<()> {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(DashMap::new()));
        Ok(())
    }

    async fn add_documents(&self, collection: &str, documents: AddDocuments) -> Result<()> {
        documents.validate()?;
        let store = self.collection(collection)?;

        let vectors = match documents.vectors {
            Some(vectors) => vectors,
            None => self.embedder.embed_batch(&documents.texts).await?,
        };

        for ((id, text), (metadata, vector)) in documents
            .ids
            .into_iter()
            .zip(documents.texts)
            .zip(documents.metadatas.into_iter().zip(vectors))
        {
            store.insert(
                id,
                StoredDocument {
                    text,
                    metadata,
                    vector,
                },
            );
        }

        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        query_texts: &[String],
        k: usize,
        filter: Option<&Map<String, Value>>,
    ) -> Result<Vec<Vec<QueryMatch>>> {
        let store = self.collection(collection)?;

        let mut results = Vec::with_capacity(query_texts.len());
        for query_text in query_texts {
            let query_vector = self.embedder.embed(query_text).await?;

            let mut matches: Vec<QueryMatch> = store
                .iter()
                .filter(|entry| Self::matches_filter(&entry.value().metadata, filter))
                .map(|entry| QueryMatch {
                    id: entry.key().clone(),
                    text: entry.value().text.clone(),
                    distance: cosine_distance(&query_vector, &entry.value().vector),
                    metadata: entry.value().metadata.clone(),
                })
                .collect();

            matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
            matches.truncate(k);
            results.push(matches);
        }

        Ok(results)
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        let store = self.collection(collection)?;
        for id in ids {
            store.remove(id);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
