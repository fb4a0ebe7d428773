//! docpipe: PDF ingestion pipeline with durable task orchestration
//!
//! Uploaded documents move through a staged pipeline (parse → chunk → embed →
//! store) driven by a persistent, multi-lane task queue. A relational status
//! store tracks every file's lifecycle and audit trail; chunk vectors land in
//! a pluggable vector store queryable by similarity.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod processing;
pub mod providers;
pub mod server;
pub mod storage;
pub mod types;

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use pipeline::PipelineRunner;
pub use processing::{PipelineWorker, TaskQueue};
pub use storage::StatusStore;
pub use types::{
    ChunkRecord, FileRecord, FileStatus, ProcessingLog, QueueLane, TaskRecord, TaskStatus,
};
