//! Chunker trait with an LLM implementation and a sliding-window fallback

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::types::ChunkRecord;

use super::ollama::OllamaClient;

/// Trait for splitting extracted text into ordered chunks
#[async_trait]
pub trait Chunker: Send + Sync {
    /// Split `text` into an ordered list of chunks
    async fn chunk(&self, text: &str) -> Result<Vec<ChunkRecord>>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Fixed-size sliding-window chunker; the always-available fallback
pub struct SlidingWindowChunker {
    chunk_size: usize,
    min_chunk_size: usize,
}

impl SlidingWindowChunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            min_chunk_size: config.min_chunk_size.max(1),
        }
    }
}

#[async_trait]
impl Chunker for SlidingWindowChunker {
    async fn chunk(&self, text: &str) -> Result<Vec<ChunkRecord>> {
        let mut chunks = Vec::new();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(Error::Chunking("document has no text content".to_string()));
        }

        let chars: Vec<char> = trimmed.chars().collect();
        let mut start = 0;
        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            let content: String = chars[start..end].iter().collect();
            let content = content.trim().to_string();
            if content.len() >= self.min_chunk_size {
                let index = chunks.len() + 1;
                chunks.push(ChunkRecord {
                    title: format!("Document fragment {}", index),
                    summary: format!("Fragment {} of the document", index),
                    content,
                    kind: "fallback_chunk".to_string(),
                });
            }
            start = end;
        }

        if chunks.is_empty() {
            return Err(Error::Chunking(
                "chunking produced no usable fragments".to_string(),
            ));
        }

        Ok(chunks)
    }

    fn name(&self) -> &str {
        "sliding-window"
    }
}

/// LLM-driven chunker: asks Ollama to segment the document into titled,
/// summarized chunks; falls back to the sliding window on any failure.
pub struct OllamaChunker {
    client: Arc<OllamaClient>,
    fallback: SlidingWindowChunker,
}

impl OllamaChunker {
    pub fn new(client: Arc<OllamaClient>, config: &ChunkingConfig) -> Self {
        Self {
            client,
            fallback: SlidingWindowChunker::new(config),
        }
    }

    fn build_prompt(text: &str) -> String {
        format!(
            "Split the following document into coherent sections. Respond with a JSON \
             array only, where each element is an object with keys \"title\", \
             \"summary\", \"content\" and \"type\". Use type \"semantic_chunk\". Do not \
             include any text outside the JSON array.\n\nDocument:\n{}",
            text
        )
    }

    fn parse_response(response: &str) -> Result<Vec<ChunkRecord>> {
        // Models occasionally wrap the array in prose; cut to the brackets.
        let start = response.find('[');
        let end = response.rfind(']');
        let json = match (start, end) {
            (Some(s), Some(e)) if e > s => &response[s..=e],
            _ => {
                return Err(Error::Chunking(
                    "LLM response did not contain a JSON array".to_string(),
                ))
            }
        };

        let chunks: Vec<ChunkRecord> = serde_json::from_str(json)
            .map_err(|e| Error::Chunking(format!("Failed to parse LLM chunks: {}", e)))?;

        let chunks: Vec<ChunkRecord> = chunks
            .into_iter()
            .filter(|c| !c.content.trim().is_empty())
            .collect();

        if chunks.is_empty() {
            return Err(Error::Chunking("LLM returned no usable chunks".to_string()));
        }

        Ok(chunks)
    }
}

#[async_trait]
impl Chunker for OllamaChunker {
    async fn chunk(&self, text: &str) -> Result<Vec<ChunkRecord>> {
        let prompt = Self::build_prompt(text);

        match self.client.generate(&prompt).await {
            Ok(response) => match Self::parse_response(&response) {
                Ok(chunks) => Ok(chunks),
                Err(e) => {
                    tracing::warn!("LLM chunking unusable ({}), using fallback", e);
                    self.fallback.chunk(text).await
                }
            },
            Err(e) => {
                tracing::warn!("LLM chunking failed ({}), using fallback", e);
                self.fallback.chunk(text).await
            }
        }
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(chunk_size: usize) -> SlidingWindowChunker {
        SlidingWindowChunker::new(&ChunkingConfig {
            chunk_size,
            min_chunk_size: 1,
        })
    }

    #[tokio::test]
    async fn window_covers_full_text_in_order() {
        let text = "abcdefghij".repeat(5);
        let chunks = window(12).chunk(&text).await.unwrap();

        let rejoined: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rejoined, text);
        assert_eq!(chunks[0].title, "Document fragment 1");
        assert!(chunks.iter().all(|c| c.kind == "fallback_chunk"));
    }

    #[tokio::test]
    async fn window_rejects_empty_input() {
        let result = window(100).chunk("   \n ").await;
        assert!(matches!(result, Err(Error::Chunking(_))));
    }

    #[test]
    fn llm_response_with_prose_wrapper_parses() {
        let response = r#"Here you go:
        [{"title": "Intro", "summary": "Opening", "content": "Hello world", "type": "semantic_chunk"}]
        Hope that helps."#;

        let chunks = OllamaChunker::parse_response(response).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].title, "Intro");
        assert_eq!(chunks[0].kind, "semantic_chunk");
    }

    #[test]
    fn llm_response_without_array_is_rejected() {
        assert!(OllamaChunker::parse_response("no json here").is_err());
    }
}
