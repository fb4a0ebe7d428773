//! Chunk records produced by the chunking stage

use serde::{Deserialize, Serialize};

/// One chunk of a parsed document, ready for embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Short title for the chunk
    pub title: String,
    /// One-line summary
    pub summary: String,
    /// Chunk text content
    pub content: String,
    /// Chunk kind, e.g. "semantic_chunk" or "fallback_chunk"
    #[serde(rename = "type")]
    pub kind: String,
}

impl ChunkRecord {
    /// Vector store id for chunk `index` of file `file_id`
    pub fn vector_id(file_id: &uuid::Uuid, index: usize) -> String {
        format!("{}_chunk_{}", file_id, index)
    }
}
