//! SQLite status store: files, processing logs, and task rows
//!
//! Single source of truth for file lifecycle state. The submit check-and-set
//! and the cascade delete both run inside one transaction.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{
    FileRecord, FileStatus, FileUpdate, LogStatus, ProcessingLog, QueueLane, Stage, TaskRecord,
    TaskStatus,
};

/// SQLite-backed status store
pub struct StatusStore {
    conn: Arc<Mutex<Connection>>,
}

impl StatusStore {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| Error::Database(format!("Failed to open database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.migrate()?;
        Ok(store)
    }

    /// Create an in-memory database (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("Failed to open in-memory database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.migrate()?;
        Ok(store)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        // WAL mode for better concurrency
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
        "#,
        )
        .map_err(|e| Error::Database(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            -- File records
            CREATE TABLE IF NOT EXISTS files (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                filepath TEXT NOT NULL,
                file_size INTEGER NOT NULL DEFAULT 0,
                mime_type TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                progress INTEGER NOT NULL DEFAULT 0,
                message TEXT NOT NULL DEFAULT '',
                total_pages INTEGER,
                chunks_count INTEGER,
                processing_duration REAL,
                error_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_files_status ON files(status);
            CREATE INDEX IF NOT EXISTS idx_files_created_at ON files(created_at);

            -- Append-only stage audit trail
            CREATE TABLE IF NOT EXISTS processing_logs (
                id TEXT PRIMARY KEY,
                file_id TEXT NOT NULL,
                stage TEXT NOT NULL,
                status TEXT NOT NULL,
                message TEXT,
                duration REAL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_processing_logs_file_id ON processing_logs(file_id);

            -- Queue-visible tasks
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                file_id TEXT NOT NULL,
                task_type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                lane TEXT NOT NULL DEFAULT 'default',
                lane_weight INTEGER NOT NULL DEFAULT 3,
                payload TEXT NOT NULL,
                error TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL DEFAULT 3,
                next_retry_at TEXT,
                created_at TEXT NOT NULL,
                started_at TEXT,
                ended_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
            CREATE INDEX IF NOT EXISTS idx_tasks_file_id ON tasks(file_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_next_retry ON tasks(next_retry_at);
        "#,
        )
        .map_err(|e| Error::Database(format!("Failed to run migrations: {}", e)))?;

        tracing::info!("Status store migrations complete");
        Ok(())
    }

    // ==================== File Operations ====================

    /// Insert a new file record
    pub fn create_file(&self, record: &FileRecord) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO files (
                id, filename, filepath, file_size, mime_type, status, progress,
                message, total_pages, chunks_count, processing_duration,
                error_count, last_error, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
            params![
                record.id.to_string(),
                record.filename,
                record.filepath,
                record.file_size as i64,
                record.mime_type,
                record.status.as_str(),
                record.progress as i64,
                record.message,
                record.total_pages.map(|p| p as i64),
                record.chunks_count.map(|c| c as i64),
                record.processing_duration,
                record.error_count as i64,
                record.last_error,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Database(format!("Failed to create file record: {}", e)))?;

        Ok(())
    }

    /// Get a file record by id
    pub fn get_file(&self, id: Uuid) -> Result<Option<FileRecord>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare("SELECT * FROM files WHERE id = ?1")
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let record = stmt
            .query_row(params![id.to_string()], row_to_file_record)
            .optional()
            .map_err(|e| Error::Database(format!("Failed to get file record: {}", e)))?;

        Ok(record)
    }

    /// List all file records, newest first
    pub fn list_files(&self) -> Result<Vec<FileRecord>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare("SELECT * FROM files ORDER BY created_at DESC")
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let records = stmt
            .query_map([], row_to_file_record)
            .map_err(|e| Error::Database(format!("Failed to list file records: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(records)
    }

    /// List file ids currently in a given status
    pub fn list_file_ids_by_status(&self, status: FileStatus) -> Result<Vec<Uuid>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare("SELECT id FROM files WHERE status = ?1 ORDER BY created_at ASC")
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let ids = stmt
            .query_map(params![status.as_str()], |row| {
                let id: String = row.get(0)?;
                Ok(id)
            })
            .map_err(|e| Error::Database(format!("Failed to list files: {}", e)))?
            .filter_map(|r| r.ok())
            .filter_map(|s| Uuid::parse_str(&s).ok())
            .collect();

        Ok(ids)
    }

    /// Apply a partial patch to a file record; only supplied fields change,
    /// `updated_at` always refreshes. Returns false if the row no longer exists.
    pub fn update_file(&self, id: Uuid, update: &FileUpdate) -> Result<bool> {
        let conn = self.conn.lock();

        let count = conn
            .execute(
                r#"
                UPDATE files SET
                    status = COALESCE(?2, status),
                    progress = COALESCE(?3, progress),
                    message = COALESCE(?4, message),
                    total_pages = COALESCE(?5, total_pages),
                    chunks_count = COALESCE(?6, chunks_count),
                    processing_duration = COALESCE(?7, processing_duration),
                    last_error = COALESCE(?8, last_error),
                    error_count = error_count + ?9,
                    updated_at = ?10
                WHERE id = ?1
                "#,
                params![
                    id.to_string(),
                    update.status.map(|s| s.as_str()),
                    update.progress.map(|p| p as i64),
                    update.message,
                    update.total_pages.map(|p| p as i64),
                    update.chunks_count.map(|c| c as i64),
                    update.processing_duration,
                    update.last_error,
                    if update.increment_error_count { 1i64 } else { 0 },
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| Error::Database(format!("Failed to update file record: {}", e)))?;

        Ok(count > 0)
    }

    /// Delete a file record together with its logs and tasks, atomically.
    /// Returns false if the file did not exist; nothing is deleted in that case.
    pub fn delete_file(&self, id: Uuid) -> Result<bool> {
        let mut conn = self.conn.lock();

        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        let id_str = id.to_string();
        let exists: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM files WHERE id = ?1",
                params![&id_str],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(format!("Failed to check file: {}", e)))?;

        if exists == 0 {
            return Ok(false);
        }

        tx.execute(
            "DELETE FROM processing_logs WHERE file_id = ?1",
            params![&id_str],
        )
        .map_err(|e| Error::Database(format!("Failed to delete logs: {}", e)))?;
        tx.execute("DELETE FROM tasks WHERE file_id = ?1", params![&id_str])
            .map_err(|e| Error::Database(format!("Failed to delete tasks: {}", e)))?;
        tx.execute("DELETE FROM files WHERE id = ?1", params![&id_str])
            .map_err(|e| Error::Database(format!("Failed to delete file record: {}", e)))?;

        tx.commit()
            .map_err(|e| Error::Database(format!("Failed to commit delete: {}", e)))?;

        Ok(true)
    }

    /// Aggregate statistics over all file records
    pub fn stats(&self) -> Result<PipelineStats> {
        let conn = self.conn.lock();

        let count = |sql: &str| -> i64 {
            conn.query_row(sql, [], |row| row.get(0)).unwrap_or(0)
        };

        let total_files = count("SELECT COUNT(*) FROM files");
        let completed_files = count("SELECT COUNT(*) FROM files WHERE status = 'completed'");
        let error_files = count("SELECT COUNT(*) FROM files WHERE status = 'error'");
        let processing_files = count(
            "SELECT COUNT(*) FROM files WHERE status IN ('parsing', 'chunking', 'embedding', 'storing')",
        );
        let pending_files = count("SELECT COUNT(*) FROM files WHERE status = 'pending'");

        let total_chunks: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(chunks_count), 0) FROM files",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        let success_rate = if total_files == 0 {
            0.0
        } else {
            let rate = completed_files as f64 / total_files as f64 * 100.0;
            (rate * 100.0).round() / 100.0
        };

        Ok(PipelineStats {
            total_files: total_files as usize,
            completed_files: completed_files as usize,
            error_files: error_files as usize,
            processing_files: processing_files as usize,
            pending_files: pending_files as usize,
            total_chunks: total_chunks as u64,
            success_rate,
        })
    }

    // ==================== Processing Log Operations ====================

    /// Append a stage log row
    pub fn append_log(
        &self,
        file_id: Uuid,
        stage: Stage,
        status: LogStatus,
        message: Option<&str>,
        duration: Option<f64>,
    ) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO processing_logs (id, file_id, stage, status, message, duration, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                Uuid::new_v4().to_string(),
                file_id.to_string(),
                stage.as_str(),
                status.as_str(),
                message,
                duration,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Database(format!("Failed to append log: {}", e)))?;

        Ok(())
    }

    /// Get the stage log for a file, oldest first
    pub fn get_logs(&self, file_id: Uuid) -> Result<Vec<ProcessingLog>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare("SELECT * FROM processing_logs WHERE file_id = ?1 ORDER BY created_at ASC")
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let logs = stmt
            .query_map(params![file_id.to_string()], row_to_log)
            .map_err(|e| Error::Database(format!("Failed to get logs: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(logs)
    }

    // ==================== Task Operations ====================

    /// Atomic submit check-and-set: verify the file exists and accepts a new
    /// submission, reject if an active task exists, supersede any retrying
    /// task, reset the file to `pending`, and insert the new pending task.
    /// All inside one transaction so two concurrent submits serialize.
    pub fn try_begin_task(
        &self,
        file_id: Uuid,
        lane: QueueLane,
        lane_weight: u32,
        max_attempts: u32,
    ) -> Result<TaskRecord> {
        let mut conn = self.conn.lock();

        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        let file_id_str = file_id.to_string();
        let status: Option<String> = tx
            .query_row(
                "SELECT status FROM files WHERE id = ?1",
                params![&file_id_str],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Database(format!("Failed to read file status: {}", e)))?;

        let status = match status {
            Some(s) => FileStatus::from_str(&s),
            None => return Err(Error::FileNotFound(file_id_str)),
        };

        if !status.accepts_submission() {
            return Err(Error::Conflict(format!(
                "file is {} and cannot be re-submitted",
                status.as_str()
            )));
        }

        let active: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM tasks WHERE file_id = ?1 AND status IN ('pending', 'running')",
                params![&file_id_str],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(format!("Failed to check active tasks: {}", e)))?;

        if active > 0 {
            return Err(Error::Conflict(
                "file already has an active task".to_string(),
            ));
        }

        let now = Utc::now().to_rfc3339();

        // A retrying task from a previous submission is superseded rather
        // than left to redeliver alongside the new one.
        tx.execute(
            "UPDATE tasks SET status = 'failed', error = 'superseded by re-submission', ended_at = ?2 \
             WHERE file_id = ?1 AND status = 'retrying'",
            params![&file_id_str, &now],
        )
        .map_err(|e| Error::Database(format!("Failed to supersede retrying task: {}", e)))?;

        tx.execute(
            "UPDATE files SET status = 'pending', progress = 0, message = 'Queued for processing', updated_at = ?2 \
             WHERE id = ?1",
            params![&file_id_str, &now],
        )
        .map_err(|e| Error::Database(format!("Failed to reset file status: {}", e)))?;

        let task = TaskRecord::new(file_id, lane, max_attempts);
        tx.execute(
            r#"
            INSERT INTO tasks (
                id, file_id, task_type, status, lane, lane_weight, payload, error,
                retry_count, max_attempts, next_retry_at, created_at, started_at, ended_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, 0, ?8, NULL, ?9, NULL, NULL)
            "#,
            params![
                task.id.to_string(),
                &file_id_str,
                task.task_type,
                task.status.as_str(),
                task.lane.as_str(),
                lane_weight as i64,
                task.payload,
                max_attempts as i64,
                task.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Database(format!("Failed to insert task: {}", e)))?;

        tx.commit()
            .map_err(|e| Error::Database(format!("Failed to commit submit: {}", e)))?;

        Ok(task)
    }

    /// Claim the next due task, preferring higher-weight lanes, FIFO within a
    /// lane. The claimed task is marked running before the transaction commits.
    pub fn claim_due_task(&self) -> Result<Option<TaskRecord>> {
        let mut conn = self.conn.lock();

        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        let now = Utc::now();
        let due: Option<TaskRecord> = tx
            .query_row(
                r#"
                SELECT * FROM tasks
                WHERE status IN ('pending', 'retrying')
                  AND (next_retry_at IS NULL OR next_retry_at <= ?1)
                ORDER BY lane_weight DESC, created_at ASC
                LIMIT 1
                "#,
                params![now.to_rfc3339()],
                row_to_task_record,
            )
            .optional()
            .map_err(|e| Error::Database(format!("Failed to select due task: {}", e)))?;

        let Some(mut task) = due else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE tasks SET status = 'running', started_at = ?2, next_retry_at = NULL WHERE id = ?1",
            params![task.id.to_string(), now.to_rfc3339()],
        )
        .map_err(|e| Error::Database(format!("Failed to mark task running: {}", e)))?;

        tx.commit()
            .map_err(|e| Error::Database(format!("Failed to commit claim: {}", e)))?;

        task.status = TaskStatus::Running;
        task.started_at = Some(now);
        Ok(Some(task))
    }

    /// Mark a task completed
    pub fn complete_task(&self, task_id: Uuid) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "UPDATE tasks SET status = 'completed', ended_at = ?2, error = NULL WHERE id = ?1",
            params![task_id.to_string(), Utc::now().to_rfc3339()],
        )
        .map_err(|e| Error::Database(format!("Failed to complete task: {}", e)))?;

        Ok(())
    }

    /// Schedule a retry: bump the delivery count and set the due time
    pub fn mark_task_retrying(
        &self,
        task_id: Uuid,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            UPDATE tasks SET
                status = 'retrying',
                retry_count = retry_count + 1,
                error = ?2,
                next_retry_at = ?3
            WHERE id = ?1
            "#,
            params![
                task_id.to_string(),
                error,
                next_retry_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Database(format!("Failed to mark task retrying: {}", e)))?;

        Ok(())
    }

    /// Mark a task terminally failed
    pub fn mark_task_failed(&self, task_id: Uuid, error: &str) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "UPDATE tasks SET status = 'failed', error = ?2, ended_at = ?3 WHERE id = ?1",
            params![task_id.to_string(), error, Utc::now().to_rfc3339()],
        )
        .map_err(|e| Error::Database(format!("Failed to mark task failed: {}", e)))?;

        Ok(())
    }

    /// Get a task by id
    pub fn get_task(&self, task_id: Uuid) -> Result<Option<TaskRecord>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare("SELECT * FROM tasks WHERE id = ?1")
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let task = stmt
            .query_row(params![task_id.to_string()], row_to_task_record)
            .optional()
            .map_err(|e| Error::Database(format!("Failed to get task: {}", e)))?;

        Ok(task)
    }

    /// All tasks for a file, newest first
    pub fn tasks_for_file(&self, file_id: Uuid) -> Result<Vec<TaskRecord>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare("SELECT * FROM tasks WHERE file_id = ?1 ORDER BY created_at DESC")
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let tasks = stmt
            .query_map(params![file_id.to_string()], row_to_task_record)
            .map_err(|e| Error::Database(format!("Failed to list tasks: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(tasks)
    }

    /// Counts of tasks by status
    pub fn queue_stats(&self) -> Result<QueueStats> {
        let conn = self.conn.lock();

        let count = |status: &str| -> i64 {
            conn.query_row(
                "SELECT COUNT(*) FROM tasks WHERE status = ?1",
                params![status],
                |row| row.get(0),
            )
            .unwrap_or(0)
        };

        Ok(QueueStats {
            pending: count("pending") as usize,
            running: count("running") as usize,
            retrying: count("retrying") as usize,
            completed: count("completed") as usize,
            failed: count("failed") as usize,
        })
    }

    /// Demote tasks left running by a dead process so they are redelivered.
    /// Called once at queue startup.
    pub fn recover_orphaned_tasks(&self) -> Result<usize> {
        let conn = self.conn.lock();

        let count = conn
            .execute(
                "UPDATE tasks SET status = 'retrying', next_retry_at = ?1 WHERE status = 'running'",
                params![Utc::now().to_rfc3339()],
            )
            .map_err(|e| Error::Database(format!("Failed to recover tasks: {}", e)))?;

        Ok(count)
    }

    /// Delete completed/failed tasks older than the cutoff
    pub fn cleanup_old_tasks(&self, days_to_keep: i64) -> Result<usize> {
        let conn = self.conn.lock();

        let cutoff = (Utc::now() - chrono::Duration::days(days_to_keep)).to_rfc3339();

        let count = conn
            .execute(
                "DELETE FROM tasks WHERE status IN ('completed', 'failed') AND ended_at < ?1",
                params![cutoff],
            )
            .map_err(|e| Error::Database(format!("Failed to cleanup tasks: {}", e)))?;

        Ok(count)
    }
}

/// Aggregate file statistics for reporting
#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineStats {
    pub total_files: usize,
    pub completed_files: usize,
    pub error_files: usize,
    pub processing_files: usize,
    pub pending_files: usize,
    pub total_chunks: u64,
    /// completed / total * 100, rounded to two decimals; 0 when no files
    pub success_rate: f64,
}

/// Counts of tasks by status
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub running: usize,
    pub retrying: usize,
    pub completed: usize,
    pub failed: usize,
}

// ==================== Row Mappers ====================

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_file_record(row: &rusqlite::Row) -> rusqlite::Result<FileRecord> {
    let id_str: String = row.get(0)?;
    let filename: String = row.get(1)?;
    let filepath: String = row.get(2)?;
    let file_size: i64 = row.get(3)?;
    let mime_type: Option<String> = row.get(4)?;
    let status_str: String = row.get(5)?;
    let progress: i64 = row.get(6)?;
    let message: String = row.get(7)?;
    let total_pages: Option<i64> = row.get(8)?;
    let chunks_count: Option<i64> = row.get(9)?;
    let processing_duration: Option<f64> = row.get(10)?;
    let error_count: i64 = row.get(11)?;
    let last_error: Option<String> = row.get(12)?;
    let created_at_str: String = row.get(13)?;
    let updated_at_str: String = row.get(14)?;

    Ok(FileRecord {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::new_v4()),
        filename,
        filepath,
        file_size: file_size as u64,
        mime_type,
        status: FileStatus::from_str(&status_str),
        progress: progress.clamp(0, 100) as u8,
        message,
        total_pages: total_pages.map(|p| p as u32),
        chunks_count: chunks_count.map(|c| c as u32),
        processing_duration,
        error_count: error_count as u32,
        last_error,
        created_at: parse_timestamp(&created_at_str),
        updated_at: parse_timestamp(&updated_at_str),
    })
}

fn row_to_task_record(row: &rusqlite::Row) -> rusqlite::Result<TaskRecord> {
    let id_str: String = row.get(0)?;
    let file_id_str: String = row.get(1)?;
    let task_type: String = row.get(2)?;
    let status_str: String = row.get(3)?;
    let lane_str: String = row.get(4)?;
    let _lane_weight: i64 = row.get(5)?;
    let payload: String = row.get(6)?;
    let error: Option<String> = row.get(7)?;
    let retry_count: i64 = row.get(8)?;
    let max_attempts: i64 = row.get(9)?;
    let next_retry_at_str: Option<String> = row.get(10)?;
    let created_at_str: String = row.get(11)?;
    let started_at_str: Option<String> = row.get(12)?;
    let ended_at_str: Option<String> = row.get(13)?;

    Ok(TaskRecord {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::new_v4()),
        file_id: Uuid::parse_str(&file_id_str).unwrap_or_else(|_| Uuid::new_v4()),
        task_type,
        status: TaskStatus::from_str(&status_str),
        lane: QueueLane::from_str(&lane_str),
        payload,
        error,
        retry_count: retry_count as u32,
        max_attempts: max_attempts as u32,
        next_retry_at: next_retry_at_str.as_deref().map(parse_timestamp),
        created_at: parse_timestamp(&created_at_str),
        started_at: started_at_str.as_deref().map(parse_timestamp),
        ended_at: ended_at_str.as_deref().map(parse_timestamp),
    })
}

fn row_to_log(row: &rusqlite::Row) -> rusqlite::Result<ProcessingLog> {
    let id_str: String = row.get(0)?;
    let file_id_str: String = row.get(1)?;
    let stage_str: String = row.get(2)?;
    let status_str: String = row.get(3)?;
    let message: Option<String> = row.get(4)?;
    let duration: Option<f64> = row.get(5)?;
    let created_at_str: String = row.get(6)?;

    Ok(ProcessingLog {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::new_v4()),
        file_id: Uuid::parse_str(&file_id_str).unwrap_or_else(|_| Uuid::new_v4()),
        stage: Stage::from_str(&stage_str),
        status: LogStatus::from_str(&status_str),
        message,
        duration,
        created_at: parse_timestamp(&created_at_str),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file() -> FileRecord {
        FileRecord::new(
            "report.pdf".to_string(),
            "/tmp/uploads/report.pdf".to_string(),
            4096,
            Some("application/pdf".to_string()),
        )
    }

    #[test]
    fn create_and_get_file() {
        let store = StatusStore::in_memory().unwrap();
        let record = sample_file();

        store.create_file(&record).unwrap();

        let fetched = store.get_file(record.id).unwrap().unwrap();
        assert_eq!(fetched.filename, "report.pdf");
        assert_eq!(fetched.status, FileStatus::Pending);
        assert_eq!(fetched.progress, 0);
        assert_eq!(fetched.error_count, 0);
    }

    #[test]
    fn list_orders_newest_first() {
        let store = StatusStore::in_memory().unwrap();

        let mut first = sample_file();
        first.created_at = Utc::now() - chrono::Duration::seconds(10);
        let second = sample_file();

        store.create_file(&first).unwrap();
        store.create_file(&second).unwrap();

        let listed = store.list_files().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }

    #[test]
    fn partial_patch_leaves_other_fields() {
        let store = StatusStore::in_memory().unwrap();
        let record = sample_file();
        store.create_file(&record).unwrap();

        store
            .update_file(
                record.id,
                &FileUpdate {
                    message: Some("still waiting".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        let fetched = store.get_file(record.id).unwrap().unwrap();
        assert_eq!(fetched.message, "still waiting");
        assert_eq!(fetched.status, FileStatus::Pending);
        assert_eq!(fetched.progress, 0);
        assert!(fetched.updated_at >= record.updated_at);
    }

    #[test]
    fn failure_patch_increments_error_count() {
        let store = StatusStore::in_memory().unwrap();
        let record = sample_file();
        store.create_file(&record).unwrap();

        store
            .update_file(record.id, &FileUpdate::failure("Processing failed", "boom"))
            .unwrap();
        store
            .update_file(record.id, &FileUpdate::failure("Processing failed", "boom again"))
            .unwrap();

        let fetched = store.get_file(record.id).unwrap().unwrap();
        assert_eq!(fetched.status, FileStatus::Error);
        assert_eq!(fetched.error_count, 2);
        assert_eq!(fetched.last_error.as_deref(), Some("boom again"));
    }

    #[test]
    fn update_missing_file_is_noop() {
        let store = StatusStore::in_memory().unwrap();
        let touched = store
            .update_file(Uuid::new_v4(), &FileUpdate::status(FileStatus::Parsing, 10, "x"))
            .unwrap();
        assert!(!touched);
    }

    #[test]
    fn delete_cascades_logs_and_tasks() {
        let store = StatusStore::in_memory().unwrap();
        let record = sample_file();
        store.create_file(&record).unwrap();

        store
            .append_log(record.id, Stage::Parsing, LogStatus::Started, Some("go"), None)
            .unwrap();
        store
            .append_log(record.id, Stage::Parsing, LogStatus::Failed, Some("no"), Some(0.5))
            .unwrap();
        store
            .try_begin_task(record.id, QueueLane::Default, 3, 3)
            .unwrap();

        assert!(store.delete_file(record.id).unwrap());

        assert!(store.get_file(record.id).unwrap().is_none());
        assert!(store.get_logs(record.id).unwrap().is_empty());
        assert!(store.tasks_for_file(record.id).unwrap().is_empty());
    }

    #[test]
    fn delete_missing_file_returns_false() {
        let store = StatusStore::in_memory().unwrap();
        assert!(!store.delete_file(Uuid::new_v4()).unwrap());
    }

    #[test]
    fn submit_rejected_while_task_active() {
        let store = StatusStore::in_memory().unwrap();
        let record = sample_file();
        store.create_file(&record).unwrap();

        store
            .try_begin_task(record.id, QueueLane::Default, 3, 3)
            .unwrap();

        let second = store.try_begin_task(record.id, QueueLane::Default, 3, 3);
        assert!(matches!(second, Err(Error::Conflict(_))));
    }

    #[test]
    fn submit_rejected_for_processing_and_completed() {
        let store = StatusStore::in_memory().unwrap();
        let record = sample_file();
        store.create_file(&record).unwrap();

        for status in [FileStatus::Parsing, FileStatus::Completed] {
            store
                .update_file(record.id, &FileUpdate::status(status, 50, "busy"))
                .unwrap();
            let result = store.try_begin_task(record.id, QueueLane::Default, 3, 3);
            assert!(matches!(result, Err(Error::Conflict(_))), "{:?}", status);
        }
    }

    #[test]
    fn submit_accepted_after_error_resets_progress() {
        let store = StatusStore::in_memory().unwrap();
        let record = sample_file();
        store.create_file(&record).unwrap();

        store
            .update_file(record.id, &FileUpdate::failure("Processing failed", "boom"))
            .unwrap();
        store
            .update_file(
                record.id,
                &FileUpdate {
                    progress: Some(40),
                    ..Default::default()
                },
            )
            .unwrap();

        store
            .try_begin_task(record.id, QueueLane::Default, 3, 3)
            .unwrap();

        let fetched = store.get_file(record.id).unwrap().unwrap();
        assert_eq!(fetched.status, FileStatus::Pending);
        assert_eq!(fetched.progress, 0);
    }

    #[test]
    fn submit_missing_file_is_not_found() {
        let store = StatusStore::in_memory().unwrap();
        let result = store.try_begin_task(Uuid::new_v4(), QueueLane::Default, 3, 3);
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }

    #[test]
    fn resubmission_supersedes_retrying_task() {
        let store = StatusStore::in_memory().unwrap();
        let record = sample_file();
        store.create_file(&record).unwrap();

        let task = store
            .try_begin_task(record.id, QueueLane::Default, 3, 3)
            .unwrap();
        store.claim_due_task().unwrap().unwrap();
        store
            .mark_task_retrying(task.id, "transient", Utc::now() + chrono::Duration::hours(1))
            .unwrap();
        store
            .update_file(record.id, &FileUpdate::failure("Processing failed", "transient"))
            .unwrap();

        let replacement = store
            .try_begin_task(record.id, QueueLane::Default, 3, 3)
            .unwrap();
        assert_ne!(replacement.id, task.id);

        let old = store.get_task(task.id).unwrap().unwrap();
        assert_eq!(old.status, TaskStatus::Failed);
        assert_eq!(old.error.as_deref(), Some("superseded by re-submission"));
    }

    #[test]
    fn claim_prefers_heavier_lanes() {
        let store = StatusStore::in_memory().unwrap();
        let low = sample_file();
        let critical = sample_file();
        store.create_file(&low).unwrap();
        store.create_file(&critical).unwrap();

        store.try_begin_task(low.id, QueueLane::Low, 1, 3).unwrap();
        let critical_task = store
            .try_begin_task(critical.id, QueueLane::Critical, 6, 3)
            .unwrap();

        let claimed = store.claim_due_task().unwrap().unwrap();
        assert_eq!(claimed.id, critical_task.id);
        assert_eq!(claimed.status, TaskStatus::Running);
        assert!(claimed.started_at.is_some());
    }

    #[test]
    fn retrying_task_not_due_until_backoff_elapses() {
        let store = StatusStore::in_memory().unwrap();
        let record = sample_file();
        store.create_file(&record).unwrap();

        let task = store
            .try_begin_task(record.id, QueueLane::Default, 3, 3)
            .unwrap();
        store.claim_due_task().unwrap().unwrap();
        store
            .mark_task_retrying(task.id, "transient", Utc::now() + chrono::Duration::hours(1))
            .unwrap();

        assert!(store.claim_due_task().unwrap().is_none());

        store
            .mark_task_retrying(task.id, "transient", Utc::now() - chrono::Duration::seconds(1))
            .unwrap();
        let claimed = store.claim_due_task().unwrap().unwrap();
        assert_eq!(claimed.id, task.id);
        assert_eq!(claimed.retry_count, 2);
    }

    #[test]
    fn recover_demotes_running_tasks() {
        let store = StatusStore::in_memory().unwrap();
        let record = sample_file();
        store.create_file(&record).unwrap();

        let task = store
            .try_begin_task(record.id, QueueLane::Default, 3, 3)
            .unwrap();
        store.claim_due_task().unwrap().unwrap();

        assert_eq!(store.recover_orphaned_tasks().unwrap(), 1);

        let recovered = store.get_task(task.id).unwrap().unwrap();
        assert_eq!(recovered.status, TaskStatus::Retrying);
        assert!(store.claim_due_task().unwrap().is_some());
    }

    #[test]
    fn aggregate_stats_and_success_rate() {
        let store = StatusStore::in_memory().unwrap();

        assert_eq!(store.stats().unwrap().success_rate, 0.0);

        let completed = sample_file();
        let failed = sample_file();
        let waiting = sample_file();
        for record in [&completed, &failed, &waiting] {
            store.create_file(record).unwrap();
        }

        store
            .update_file(
                completed.id,
                &FileUpdate {
                    status: Some(FileStatus::Completed),
                    progress: Some(100),
                    chunks_count: Some(7),
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .update_file(failed.id, &FileUpdate::failure("Processing failed", "boom"))
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.completed_files, 1);
        assert_eq!(stats.error_files, 1);
        assert_eq!(stats.pending_files, 1);
        assert_eq!(stats.total_chunks, 7);
        assert_eq!(stats.success_rate, 33.33);
    }

    #[test]
    fn logs_are_ordered_and_immutable_rows() {
        let store = StatusStore::in_memory().unwrap();
        let record = sample_file();
        store.create_file(&record).unwrap();

        store
            .append_log(record.id, Stage::Parsing, LogStatus::Started, None, None)
            .unwrap();
        store
            .append_log(record.id, Stage::Parsing, LogStatus::Completed, Some("ok"), Some(1.2))
            .unwrap();
        store
            .append_log(record.id, Stage::Chunking, LogStatus::Started, None, None)
            .unwrap();

        let logs = store.get_logs(record.id).unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].stage, Stage::Parsing);
        assert_eq!(logs[0].status, LogStatus::Started);
        assert_eq!(logs[1].duration, Some(1.2));
        assert_eq!(logs[2].stage, Stage::Chunking);
    }

    #[test]
    fn cleanup_removes_only_old_terminal_tasks() {
        let store = StatusStore::in_memory().unwrap();
        let record = sample_file();
        store.create_file(&record).unwrap();

        let task = store
            .try_begin_task(record.id, QueueLane::Default, 3, 3)
            .unwrap();
        store.claim_due_task().unwrap().unwrap();
        store.complete_task(task.id).unwrap();

        // Recent terminal task survives a 7-day cutoff
        assert_eq!(store.cleanup_old_tasks(7).unwrap(), 0);
        // A zero-day cutoff only removes tasks ended strictly before now
        store.cleanup_old_tasks(0).unwrap();
        assert!(store.queue_stats().unwrap().pending == 0);
    }
}
