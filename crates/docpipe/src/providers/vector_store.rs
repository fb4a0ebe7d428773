//! Narrow vector store contract consumed by the storing stage

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Documents to add in one call; `ids`, `texts` and `metadatas` run in
/// parallel, `vectors` may be supplied or left for the store to compute.
#[derive(Debug, Clone, Default)]
pub struct AddDocuments {
    pub ids: Vec<String>,
    pub texts: Vec<String>,
    pub metadatas: Vec<Map<String, Value>>,
    pub vectors: Option<Vec<Vec<f32>>>,
}

impl AddDocuments {
    /// Validate in-call invariants: matching lengths and unique ids
    pub fn validate(&self) -> Result<()> {
        if self.ids.len() != self.texts.len() || self.ids.len() != self.metadatas.len() {
            return Err(Error::Validation(format!(
                "mismatched lengths: {} ids, {} texts, {} metadatas",
                self.ids.len(),
                self.texts.len(),
                self.metadatas.len()
            )));
        }
        if let Some(vectors) = &self.vectors {
            if vectors.len() != self.ids.len() {
                return Err(Error::Validation(format!(
                    "mismatched lengths: {} ids, {} vectors",
                    self.ids.len(),
                    vectors.len()
                )));
            }
        }

        let mut seen = std::collections::HashSet::with_capacity(self.ids.len());
        for id in &self.ids {
            if !seen.insert(id.as_str()) {
                return Err(Error::Validation(format!("duplicate document id: {}", id)));
            }
        }
        Ok(())
    }
}

/// One similarity match; lower distance means more similar
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueryMatch {
    pub id: String,
    pub text: String,
    pub distance: f32,
    pub metadata: Map<String, Value>,
}

/// Trait for the vector store collaborators
///
/// Implementations:
/// - `MemoryVectorStore`: in-process store, the default backend
/// - `ChromaStore`: Chroma HTTP server
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Idempotent collection create; "already exists" is success
    async fn ensure_collection(&self, name: &str) -> Result<()>;

    /// Add documents; partial failure surfaces as one error for the call
    async fn add_documents(&self, collection: &str, documents: AddDocuments) -> Result<()>;

    /// Per query text, matches ordered by ascending distance
    async fn query(
        &self,
        collection: &str,
        query_texts: &[String],
        k: usize,
        filter: Option<&Map<String, Value>>,
    ) -> Result<Vec<Vec<QueryMatch>>>;

    /// Best-effort removal by id
    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_ids_rejected() {
        let documents = AddDocuments {
            ids: vec!["a".to_string(), "a".to_string()],
            texts: vec!["x".to_string(), "y".to_string()],
            metadatas: vec![Map::new(), Map::new()],
            vectors: None,
        };
        assert!(matches!(documents.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn mismatched_lengths_rejected() {
        let documents = AddDocuments {
            ids: vec!["a".to_string()],
            texts: vec![],
            metadatas: vec![Map::new()],
            vectors: None,
        };
        assert!(documents.validate().is_err());
    }
}
