//! Stub collaborators shared by tests across modules

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Error, Result};
use crate::types::ChunkRecord;

use super::chunker::Chunker;
use super::embedding::EmbeddingProvider;
use super::parser::{DocumentParser, ParsedDocument};

/// Deterministic bag-of-words embedder: token hashes bucketed into a
/// fixed-width count vector, so shared vocabulary means proximity.
pub(crate) struct HashEmbedder;

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; 64];
        for token in text.split_whitespace() {
            let token = token.to_lowercase();
            let mut hash: u64 = 1469598103934665603;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            vector[(hash % 64) as usize] += 1.0;
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        64
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "hash"
    }
}

/// Parser returning a fixed text without touching the filesystem
pub(crate) struct StaticParser {
    pub content: String,
    pub total_pages: u32,
}

#[async_trait]
impl DocumentParser for StaticParser {
    async fn parse(&self, _path: &Path) -> Result<ParsedDocument> {
        Ok(ParsedDocument {
            content: self.content.clone(),
            total_pages: self.total_pages,
        })
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Parser that fails every call, counting the attempts
pub(crate) struct FailingParser {
    pub attempts: AtomicU32,
}

impl FailingParser {
    pub fn new() -> Self {
        Self {
            attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl DocumentParser for FailingParser {
    async fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::parse(
            path.display().to_string(),
            "simulated transient parser outage",
        ))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Chunker that splits on blank lines, one chunk per paragraph
pub(crate) struct ParagraphChunker;

#[async_trait]
impl Chunker for ParagraphChunker {
    async fn chunk(&self, text: &str) -> Result<Vec<ChunkRecord>> {
        let chunks: Vec<ChunkRecord> = text
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .enumerate()
            .map(|(i, paragraph)| ChunkRecord {
                title: format!("Section {}", i + 1),
                summary: format!("Paragraph {} of the document", i + 1),
                content: paragraph.to_string(),
                kind: "semantic_chunk".to_string(),
            })
            .collect();

        if chunks.is_empty() {
            return Err(Error::Chunking("no paragraphs found".to_string()));
        }
        Ok(chunks)
    }

    fn name(&self) -> &str {
        "paragraph"
    }
}
