//! Append-only audit trail of stage attempts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pipeline stage a log row refers to
///
/// `Pipeline` marks the whole-run summary rows written at completion or
/// terminal failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Parsing,
    Chunking,
    Embedding,
    Storing,
    #[serde(rename = "processing")]
    Pipeline,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Parsing => "parsing",
            Stage::Chunking => "chunking",
            Stage::Embedding => "embedding",
            Stage::Storing => "storing",
            Stage::Pipeline => "processing",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "parsing" => Stage::Parsing,
            "chunking" => Stage::Chunking,
            "embedding" => Stage::Embedding,
            "storing" => Stage::Storing,
            _ => Stage::Pipeline,
        }
    }
}

/// Outcome recorded for a stage attempt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Started,
    Completed,
    Failed,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Started => "started",
            LogStatus::Completed => "completed",
            LogStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "started" => LogStatus::Started,
            "completed" => LogStatus::Completed,
            _ => LogStatus::Failed,
        }
    }
}

/// One row per stage attempt; never mutated after creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingLog {
    pub id: Uuid,
    pub file_id: Uuid,
    pub stage: Stage,
    pub status: LogStatus,
    pub message: Option<String>,
    /// Stage duration in seconds, recorded on completion/failure
    pub duration: Option<f64>,
    pub created_at: DateTime<Utc>,
}
