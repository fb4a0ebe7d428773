//! Task records: the queue-visible unit of work

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task type for document processing
pub const TASK_PROCESS_DOCUMENT: &str = "process_document";

/// Queue-side state of a task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Retrying,
}

impl TaskStatus {
    /// Pending and running tasks block further submissions for their file
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Retrying => "retrying",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pending" => TaskStatus::Pending,
            "running" => TaskStatus::Running,
            "completed" => TaskStatus::Completed,
            "retrying" => TaskStatus::Retrying,
            _ => TaskStatus::Failed,
        }
    }
}

/// Named priority lane; a fairness knob, not a correctness requirement
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueLane {
    Critical,
    #[default]
    Default,
    Low,
}

impl QueueLane {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueLane::Critical => "critical",
            QueueLane::Default => "default",
            QueueLane::Low => "low",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "critical" => QueueLane::Critical,
            "low" => QueueLane::Low,
            _ => QueueLane::Default,
        }
    }
}

/// Serialized task payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPayload {
    pub file_id: Uuid,
}

/// One processing attempt sequence for a file; retries share the task id,
/// each redelivery bumps `retry_count`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub file_id: Uuid,
    pub task_type: String,
    pub status: TaskStatus,
    pub lane: QueueLane,
    /// Serialized payload handed to the worker
    pub payload: String,
    pub error: Option<String>,
    /// Deliveries so far minus one; 0 on first delivery
    pub retry_count: u32,
    /// Total attempts allowed before the task is abandoned
    pub max_attempts: u32,
    /// Earliest time a retrying task becomes due again
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Create a pending processing task for a file
    pub fn new(file_id: Uuid, lane: QueueLane, max_attempts: u32) -> Self {
        let payload = serde_json::to_string(&TaskPayload { file_id })
            .unwrap_or_else(|_| String::from("{}"));
        Self {
            id: Uuid::new_v4(),
            file_id,
            task_type: TASK_PROCESS_DOCUMENT.to_string(),
            status: TaskStatus::Pending,
            lane,
            payload,
            error: None,
            retry_count: 0,
            max_attempts,
            next_retry_at: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_statuses() {
        assert!(TaskStatus::Pending.is_active());
        assert!(TaskStatus::Running.is_active());
        assert!(!TaskStatus::Retrying.is_active());
        assert!(!TaskStatus::Completed.is_active());
        assert!(!TaskStatus::Failed.is_active());
    }

    #[test]
    fn payload_round_trips() {
        let task = TaskRecord::new(Uuid::new_v4(), QueueLane::Default, 3);
        let payload: TaskPayload = serde_json::from_str(&task.payload).unwrap();
        assert_eq!(payload.file_id, task.file_id);
    }
}
