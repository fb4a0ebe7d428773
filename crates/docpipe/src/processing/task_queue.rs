//! Durable task queue backed by the status store
//!
//! Submission is decoupled from execution: `enqueue` writes a pending task row
//! inside the same transaction that validates the file, then nudges an idle
//! worker. Tasks survive restarts; `recover` redelivers work a dead process
//! left behind.

use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::config::{ProcessingConfig, QueueConfig};
use crate::error::Result;
use crate::storage::{QueueStats, StatusStore};
use crate::types::{FileStatus, QueueLane, TaskRecord};

/// Multi-lane task queue with persistence
pub struct TaskQueue {
    store: Arc<StatusStore>,
    notify: Arc<Notify>,
    queue_config: QueueConfig,
    max_attempts: u32,
}

impl TaskQueue {
    pub fn new(
        store: Arc<StatusStore>,
        queue_config: QueueConfig,
        processing: &ProcessingConfig,
    ) -> Self {
        Self {
            store,
            notify: Arc::new(Notify::new()),
            queue_config,
            max_attempts: processing.max_attempts.max(1),
        }
    }

    fn lane_weight(&self, lane: QueueLane) -> u32 {
        match lane {
            QueueLane::Critical => self.queue_config.critical_weight,
            QueueLane::Default => self.queue_config.default_weight,
            QueueLane::Low => self.queue_config.low_weight,
        }
    }

    /// Submit a file for processing.
    ///
    /// Validates existence and the submission gate, enforces the single
    /// active task invariant, and inserts the pending task, all atomically.
    /// Errors with `Conflict` when the file is mid-pipeline, completed, or
    /// already queued.
    pub fn enqueue(&self, file_id: Uuid, lane: QueueLane) -> Result<TaskRecord> {
        let task = self.store.try_begin_task(
            file_id,
            lane,
            self.lane_weight(lane),
            self.max_attempts,
        )?;

        tracing::info!(
            "Enqueued task {} for file {} on {} lane",
            task.id,
            file_id,
            lane.as_str()
        );
        self.notify.notify_one();
        Ok(task)
    }

    /// Enqueue every pending file that does not already have an active task.
    /// Returns the task ids created.
    pub fn enqueue_all_pending(&self, lane: QueueLane) -> Result<Vec<Uuid>> {
        let mut task_ids = Vec::new();
        for file_id in self.store.list_file_ids_by_status(FileStatus::Pending)? {
            match self.enqueue(file_id, lane) {
                Ok(task) => task_ids.push(task.id),
                Err(crate::error::Error::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(task_ids)
    }

    /// Redeliver tasks a previous process left running. Called once at startup.
    pub fn recover(&self) -> Result<usize> {
        let recovered = self.store.recover_orphaned_tasks()?;
        if recovered > 0 {
            tracing::info!("Recovered {} orphaned tasks for redelivery", recovered);
            self.notify.notify_one();
        }
        Ok(recovered)
    }

    /// Counts of tasks by status
    pub fn stats(&self) -> Result<QueueStats> {
        self.store.queue_stats()
    }

    /// Wake handle workers park on while the queue is empty
    pub(crate) fn notify_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }

    pub(crate) fn store(&self) -> Arc<StatusStore> {
        Arc::clone(&self.store)
    }
}
