//! Configuration for the ingestion pipeline

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Main pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Worker and retry configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
    /// Queue lane weighting
    #[serde(default)]
    pub queue: QueueConfig,
    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Ollama/LLM configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// Vector store configuration
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    /// Relational storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

impl PipelineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes (default: 100MB)
    pub max_upload_size: usize,
    /// Directory where uploaded files are stored
    pub upload_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            max_upload_size: 100 * 1024 * 1024,
            upload_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("docpipe")
                .join("uploads"),
        }
    }
}

/// Worker pool and retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Number of concurrent workers (default: CPU count, max 8)
    pub worker_count: Option<usize>,
    /// Total delivery attempts per submission before the task is abandoned
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base retry delay in milliseconds; attempt n waits n * base
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Timeout for a single stage in seconds
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,
    /// Timeout for one whole processing attempt in seconds
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    /// How long an idle worker sleeps before re-polling the queue, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    1000
}
fn default_stage_timeout_secs() -> u64 {
    120
}
fn default_task_timeout_secs() -> u64 {
    600
}
fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            stage_timeout_secs: default_stage_timeout_secs(),
            task_timeout_secs: default_task_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Queue lane weighting; higher weight lanes are claimed first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_critical_weight")]
    pub critical_weight: u32,
    #[serde(default = "default_default_weight")]
    pub default_weight: u32,
    #[serde(default = "default_low_weight")]
    pub low_weight: u32,
}

fn default_critical_weight() -> u32 {
    6
}
fn default_default_weight() -> u32 {
    3
}
fn default_low_weight() -> u32 {
    1
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            critical_weight: default_critical_weight(),
            default_weight: default_default_weight(),
            low_weight: default_low_weight(),
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target chunk size in characters (fallback chunker)
    pub chunk_size: usize,
    /// Minimum chunk size; smaller trailing fragments are kept as-is
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            min_chunk_size: 1,
        }
    }
}

/// LLM (Ollama) configuration for chunking and embeddings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Embedding model name
    pub embed_model: String,
    /// Chunking model name
    pub chunk_model: String,
    /// Embedding dimensions (768 for nomic-embed-text)
    pub dimensions: usize,
    /// Temperature for chunking generation
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries for failed requests
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            embed_model: "nomic-embed-text".to_string(),
            chunk_model: "phi3".to_string(),
            dimensions: 768,
            temperature: 0.3,
            timeout_secs: 120,
            max_retries: 2,
        }
    }
}

/// Relational storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the SQLite status database
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("docpipe")
                .join("status.db"),
        }
    }
}

/// Vector store backend selection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// In-process store (no external service)
    #[default]
    Memory,
    /// Chroma HTTP server
    Chroma,
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Backend provider
    #[serde(default)]
    pub backend: VectorBackend,
    /// Collection holding document chunks
    pub collection: String,
    /// Chroma base URL (when backend = chroma)
    pub chroma_url: String,
    /// Results returned by default for similarity search
    pub default_top_k: usize,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Memory,
            collection: "documents".to_string(),
            chroma_url: "http://localhost:8000".to_string(),
            default_top_k: 5,
        }
    }
}
