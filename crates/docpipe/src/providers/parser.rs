//! Document parser trait and the PDF implementation

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Parsed document content and metadata
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// Extracted text content
    pub content: String,
    /// Total page count
    pub total_pages: u32,
}

/// Trait for extracting text from an uploaded document
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Parse the file at `path` into text plus page count
    async fn parse(&self, path: &Path) -> Result<ParsedDocument>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// PDF parser built on pdf-extract (text) and lopdf (page count)
pub struct PdfParser;

impl PdfParser {
    pub fn new() -> Self {
        Self
    }

    fn extract(path: &Path, data: &[u8]) -> Result<ParsedDocument> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let content = pdf_extract::extract_text_from_mem(data)
            .map_err(|e| Error::parse(&filename, e.to_string()))?;

        if content.trim().is_empty() {
            return Err(Error::parse(
                &filename,
                "no extractable text content".to_string(),
            ));
        }

        let total_pages = lopdf::Document::load_mem(data)
            .map(|doc| doc.get_pages().len() as u32)
            .unwrap_or_else(|e| {
                // Text extraction already succeeded; a miscounted page total
                // is not worth failing the stage over.
                tracing::warn!("lopdf page count failed for {}: {}", filename, e);
                1
            });

        Ok(ParsedDocument {
            content,
            total_pages,
        })
    }
}

impl Default for PdfParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentParser for PdfParser {
    async fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let path: PathBuf = path.to_path_buf();
        let data = tokio::fs::read(&path).await.map_err(|e| {
            Error::parse(
                path.display().to_string(),
                format!("failed to read file: {}", e),
            )
        })?;

        // pdf-extract is CPU-bound and occasionally slow on exotic fonts
        tokio::task::spawn_blocking(move || Self::extract(&path, &data))
            .await
            .map_err(|e| Error::Internal(format!("Parser task join error: {}", e)))?
    }

    fn name(&self) -> &str {
        "pdf"
    }
}
