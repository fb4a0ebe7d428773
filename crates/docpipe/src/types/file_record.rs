//! File record: the aggregate describing an uploaded document's lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of an uploaded file
///
/// Forward order is `Pending → Parsing → Chunking → Embedding → Storing →
/// Completed`; `Error` is absorbing and reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Parsing,
    Chunking,
    Embedding,
    Storing,
    Completed,
    Error,
}

impl FileStatus {
    /// True while a worker owns the file (any mid-pipeline stage)
    pub fn is_processing(&self) -> bool {
        matches!(
            self,
            FileStatus::Parsing | FileStatus::Chunking | FileStatus::Embedding | FileStatus::Storing
        )
    }

    /// Terminal for the current submission
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Completed | FileStatus::Error)
    }

    /// States from which a new process request is accepted
    pub fn accepts_submission(&self) -> bool {
        matches!(self, FileStatus::Pending | FileStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Parsing => "parsing",
            FileStatus::Chunking => "chunking",
            FileStatus::Embedding => "embedding",
            FileStatus::Storing => "storing",
            FileStatus::Completed => "completed",
            FileStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pending" => FileStatus::Pending,
            "parsing" => FileStatus::Parsing,
            "chunking" => FileStatus::Chunking,
            "embedding" => FileStatus::Embedding,
            "storing" => FileStatus::Storing,
            "completed" => FileStatus::Completed,
            _ => FileStatus::Error,
        }
    }
}

/// Persistent record of an uploaded document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Unique record ID, generated at creation
    pub id: Uuid,
    /// Original filename as uploaded
    pub filename: String,
    /// Storage path on disk
    pub filepath: String,
    /// File size in bytes
    pub file_size: u64,
    /// Detected content type
    pub mime_type: Option<String>,
    /// Current lifecycle state
    pub status: FileStatus,
    /// Progress percentage, 0-100
    pub progress: u8,
    /// Human-readable status message
    pub message: String,
    /// Total pages, known after parsing
    pub total_pages: Option<u32>,
    /// Number of chunks produced, known after chunking
    pub chunks_count: Option<u32>,
    /// Wall-clock processing time in seconds, known on completion
    pub processing_duration: Option<f64>,
    /// Number of failed processing attempts, monotonic
    pub error_count: u32,
    /// Text of the most recent failure
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    /// Create a new record in `pending` for an uploaded file
    pub fn new(filename: String, filepath: String, file_size: u64, mime_type: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            filename,
            filepath,
            file_size,
            mime_type,
            status: FileStatus::Pending,
            progress: 0,
            message: "Waiting for processing".to_string(),
            total_pages: None,
            chunks_count: None,
            processing_duration: None,
            error_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial patch applied to a file record; only supplied fields change
#[derive(Debug, Clone, Default)]
pub struct FileUpdate {
    pub status: Option<FileStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub total_pages: Option<u32>,
    pub chunks_count: Option<u32>,
    pub processing_duration: Option<f64>,
    pub last_error: Option<String>,
    /// Bump `error_count` by one as part of this patch
    pub increment_error_count: bool,
}

impl FileUpdate {
    /// Patch for entering or leaving a stage
    pub fn status(status: FileStatus, progress: u8, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            progress: Some(progress),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Patch for a failed attempt: error status plus failure bookkeeping
    pub fn failure(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: Some(FileStatus::Error),
            message: Some(message.into()),
            last_error: Some(error.into()),
            increment_error_count: true,
            ..Default::default()
        }
    }
}
