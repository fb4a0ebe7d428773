//! Worker pool: claims due tasks and drives them through the pipeline

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::config::ProcessingConfig;
use crate::error::{Error, Result};
use crate::pipeline::PipelineRunner;
use crate::processing::TaskQueue;
use crate::storage::StatusStore;
use crate::types::{FileStatus, FileUpdate, TaskPayload, TaskRecord};

/// Bounded pool of independent workers pulling from the task queue.
///
/// Each claimed task runs to completion or failure on its own spawned task so
/// a panicking stage handler is contained at the worker boundary.
pub struct PipelineWorker {
    store: Arc<StatusStore>,
    queue: Arc<TaskQueue>,
    runner: Arc<PipelineRunner>,
    worker_count: usize,
    task_timeout: Duration,
    poll_interval: Duration,
    retry_base_delay: Duration,
}

impl PipelineWorker {
    pub fn new(
        config: &ProcessingConfig,
        queue: Arc<TaskQueue>,
        runner: Arc<PipelineRunner>,
    ) -> Self {
        let worker_count = config
            .worker_count
            .unwrap_or_else(|| num_cpus::get().min(8))
            .max(1);

        tracing::info!(
            "Worker pool configured: {} workers, {}s task timeout, {} max attempts",
            worker_count,
            config.task_timeout_secs,
            config.max_attempts
        );

        Self {
            store: queue.store(),
            queue,
            runner,
            worker_count,
            task_timeout: Duration::from_secs(config.task_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    /// Recover orphaned tasks and spawn the worker loops
    pub fn start(self: Arc<Self>) -> Result<Vec<tokio::task::JoinHandle<()>>> {
        self.queue.recover()?;

        let handles = (0..self.worker_count)
            .map(|index| {
                let worker = Arc::clone(&self);
                tokio::spawn(async move { worker.run(index).await })
            })
            .collect();
        Ok(handles)
    }

    async fn run(&self, index: usize) {
        tracing::debug!("Worker {} started", index);
        let notify = self.queue.notify_handle();

        loop {
            match self.store.claim_due_task() {
                Ok(Some(task)) => self.execute(task).await,
                Ok(None) => {
                    // Park until an enqueue nudges us or the poll interval
                    // elapses; retrying tasks become due without a nudge.
                    let _ = timeout(self.poll_interval, notify.notified()).await;
                }
                Err(e) => {
                    tracing::error!("Worker {} failed to claim task: {}", index, e);
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Run one delivery of a task and record the outcome
    async fn execute(&self, task: TaskRecord) {
        let attempt = task.retry_count + 1;
        tracing::info!(
            "Executing task {} (attempt {}/{})",
            task.id,
            attempt,
            task.max_attempts
        );

        let outcome = self.run_delivery(&task).await;

        match outcome {
            Ok(()) => {
                if let Err(e) = self.store.complete_task(task.id) {
                    tracing::error!("Failed to record task {} completion: {}", task.id, e);
                }
            }
            Err(err) => self.handle_failure(&task, attempt, err),
        }
    }

    /// Execute the pipeline on a spawned task so panics and timeouts are
    /// caught here rather than taking the worker loop down.
    async fn run_delivery(&self, task: &TaskRecord) -> Result<()> {
        let payload: TaskPayload = serde_json::from_str(&task.payload)
            .map_err(|e| Error::Queue(format!("corrupt task payload: {}", e)))?;

        let runner = Arc::clone(&self.runner);
        let file_id = payload.file_id;
        let handle = tokio::spawn(async move { runner.process(file_id).await });

        match timeout(self.task_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                if join_err.is_panic() {
                    Err(Error::Internal(format!(
                        "stage handler panicked: {:?}",
                        join_err
                    )))
                } else {
                    Err(Error::Internal("processing task was aborted".to_string()))
                }
            }
            Err(_) => Err(Error::Internal(format!(
                "processing timed out after {}s",
                self.task_timeout.as_secs()
            ))),
        }
    }

    fn handle_failure(&self, task: &TaskRecord, attempt: u32, err: Error) {
        let message = err.to_string();

        if attempt < task.max_attempts {
            let delay = self.backoff_delay(attempt);
            let next_retry_at = Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(1));
            tracing::warn!(
                "Task {} attempt {}/{} failed ({}), retrying in {:?}",
                task.id,
                attempt,
                task.max_attempts,
                message,
                delay
            );
            if let Err(e) = self.store.mark_task_retrying(task.id, &message, next_retry_at) {
                tracing::error!("Failed to schedule retry for task {}: {}", task.id, e);
            }
        } else {
            tracing::error!(
                "Task {} failed terminally after {} attempts: {}",
                task.id,
                attempt,
                message
            );
            if let Err(e) = self.store.mark_task_failed(task.id, &message) {
                tracing::error!("Failed to record task {} failure: {}", task.id, e);
            }
            // The file surfaces exhaustion, not the raw stage error; the stage
            // log and last_error keep the details. Ignored if the file is gone.
            let exhausted = FileUpdate {
                status: Some(FileStatus::Error),
                message: Some(format!(
                    "Processing abandoned after {} attempts: {}",
                    attempt, message
                )),
                ..Default::default()
            };
            if let Err(e) = self.store.update_file(task.file_id, &exhausted) {
                tracing::error!("Failed to record exhaustion on file {}: {}", task.file_id, e);
            }
        }
    }

    /// Linear backoff: attempt n waits n * base; monotonically increasing
    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.retry_base_delay * attempt
    }
}
