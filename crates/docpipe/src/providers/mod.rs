//! External collaborators: parser, chunker, embeddings, and vector store

pub mod chroma;
pub mod chunker;
pub mod embedding;
pub mod memory;
pub mod ollama;
pub mod parser;
pub mod vector_store;

#[cfg(test)]
pub(crate) mod test_support;

pub use chroma::ChromaStore;
pub use chunker::{Chunker, OllamaChunker, SlidingWindowChunker};
pub use embedding::{EmbeddingProvider, OllamaEmbedder};
pub use memory::MemoryVectorStore;
pub use ollama::OllamaClient;
pub use parser::{DocumentParser, ParsedDocument, PdfParser};
pub use vector_store::{AddDocuments, QueryMatch, VectorStore};
