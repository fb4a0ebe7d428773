//! Chroma HTTP vector store client

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::config::VectorStoreConfig;
use crate::error::{Error, Result};

use super::embedding::EmbeddingProvider;
use super::vector_store::{AddDocuments, QueryMatch, VectorStore};

/// Chroma REST API client implementing the narrow store contract.
///
/// Queries are embedded client-side through the injected provider; the server
/// is only trusted with vectors, never with model choice.
pub struct ChromaStore {
    client: Client,
    base_url: String,
    embedder: Arc<dyn EmbeddingProvider>,
    /// Collection name → Chroma collection id
    collection_ids: DashMap<String, String>,
}

#[derive(Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<f32>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Map<String, Value>>>>>,
}

impl ChromaStore {
    pub fn new(config: &VectorStoreConfig, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: config.chroma_url.trim_end_matches('/').to_string(),
            embedder,
            collection_ids: DashMap::new(),
        }
    }

    /// Resolve a collection name to its Chroma id, creating it if needed
    async fn collection_id(&self, name: &str) -> Result<String> {
        if let Some(id) = self.collection_ids.get(name) {
            return Ok(id.clone());
        }

        let url = format!("{}/api/v1/collections", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "name": name, "get_or_create": true }))
            .send()
            .await
            .map_err(|e| Error::VectorStore(format!("Chroma request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::VectorStore(format!(
                "Chroma collection create failed: HTTP {}",
                response.status()
            )));
        }

        let collection: CollectionResponse = response
            .json()
            .await
            .map_err(|e| Error::VectorStore(format!("Invalid Chroma response: {}", e)))?;

        self.collection_ids
            .insert(name.to_string(), collection.id.clone());
        Ok(collection.id)
    }

    async fn post(&self, url: &str, body: Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::VectorStore(format!("Chroma request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::VectorStore(format!(
                "Chroma call failed: HTTP {}",
                response.status()
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn ensure_collection(&self, name: &str) -> Result<()> {
        self.collection_id(name).await.map(|_| ())
    }

    async fn add_documents(&self, collection: &str, documents: AddDocuments) -> Result<()> {
        documents.validate()?;
        let id = self.collection_id(collection).await?;

        let vectors = match documents.vectors {
            Some(vectors) => vectors,
            None => self.embedder.embed_batch(&documents.texts).await?,
        };

        let url = format!("{}/api/v1/collections/{}/add", self.base_url, id);
        self.post(
            &url,
            json!({
                "ids": documents.ids,
                "embeddings": vectors,
                "documents": documents.texts,
                "metadatas": documents.metadatas,
            }),
        )
        .await?;

        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        query_texts: &[String],
        k: usize,
        filter: Option<&Map<String, Value>>,
    ) -> Result<Vec<Vec<QueryMatch>>> {
        let id = self.collection_id(collection).await?;

        let query_vectors = self.embedder.embed_batch(query_texts).await?;

        let mut body = json!({
            "query_embeddings": query_vectors,
            "n_results": k,
            "include": ["documents", "distances", "metadatas"],
        });
        if let Some(filter) = filter {
            body["where"] = Value::Object(filter.clone());
        }

        let url = format!("{}/api/v1/collections/{}/query", self.base_url, id);
        let response = self.post(&url, body).await?;

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| Error::VectorStore(format!("Invalid Chroma query response: {}", e)))?;

        let mut results = Vec::with_capacity(parsed.ids.len());
        for (q, ids) in parsed.ids.into_iter().enumerate() {
            let mut matches = Vec::with_capacity(ids.len());
            for (i, match_id) in ids.into_iter().enumerate() {
                let text = parsed
                    .documents
                    .as_ref()
                    .and_then(|d| d.get(q))
                    .and_then(|row| row.get(i))
                    .and_then(|t| t.clone())
                    .unwrap_or_default();
                let distance = parsed
                    .distances
                    .as_ref()
                    .and_then(|d| d.get(q))
                    .and_then(|row| row.get(i))
                    .copied()
                    .unwrap_or(f32::MAX);
                let metadata = parsed
                    .metadatas
                    .as_ref()
                    .and_then(|m| m.get(q))
                    .and_then(|row| row.get(i))
                    .and_then(|m| m.clone())
                    .unwrap_or_default();

                matches.push(QueryMatch {
                    id: match_id,
                    text,
                    distance,
                    metadata,
                });
            }
            results.push(matches);
        }

        Ok(results)
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        let id = self.collection_id(collection).await?;

        let url = format!("{}/api/v1/collections/{}/delete", self.base_url, id);
        self.post(&url, json!({ "ids": ids })).await?;

        Ok(())
    }

    fn name(&self) -> &str {
        "chroma"
    }
}
