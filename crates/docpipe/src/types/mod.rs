//! Core types for the ingestion pipeline

pub mod chunk;
pub mod file_record;
pub mod processing_log;
pub mod task;

pub use chunk::ChunkRecord;
pub use file_record::{FileRecord, FileStatus, FileUpdate};
pub use processing_log::{LogStatus, ProcessingLog, Stage};
pub use task::{QueueLane, TaskPayload, TaskRecord, TaskStatus, TASK_PROCESS_DOCUMENT};
