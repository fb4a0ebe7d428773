//! File upload, status, and lifecycle endpoints

use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{FileRecord, ProcessingLog, QueueLane, TaskRecord};

/// Response for an accepted upload
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub files: Vec<FileRecord>,
}

/// POST /api/files - upload one or more PDF documents
pub async fn upload_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let mut records = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Validation(format!("invalid multipart payload: {}", e)))?
    {
        let filename = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => continue,
        };

        if !filename.to_lowercase().ends_with(".pdf") {
            return Err(Error::Validation(format!(
                "unsupported file type: {} (only PDF is accepted)",
                filename
            )));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| Error::Validation(format!("failed to read upload: {}", e)))?;
        if data.is_empty() {
            return Err(Error::Validation(format!("file {} is empty", filename)));
        }

        let mime_type = mime_guess::from_path(&filename)
            .first()
            .map(|m| m.essence_str().to_string());

        let file_id = Uuid::new_v4();
        let stored_path = state
            .config()
            .server
            .upload_dir
            .join(format!("{}_{}", file_id, filename));
        tokio::fs::write(&stored_path, &data).await?;

        let mut record = FileRecord::new(
            filename,
            stored_path.to_string_lossy().into_owned(),
            data.len() as u64,
            mime_type,
        );
        record.id = file_id;
        state.store().create_file(&record)?;

        tracing::info!("Uploaded {} ({} bytes) as {}", record.filename, record.file_size, record.id);
        records.push(record);
    }

    if records.is_empty() {
        return Err(Error::Validation("no files in upload".to_string()));
    }

    Ok(Json(UploadResponse { files: records }))
}

/// GET /api/files - list all file records, newest first
pub async fn list_files(State(state): State<AppState>) -> Result<Json<Vec<FileRecord>>> {
    Ok(Json(state.store().list_files()?))
}

/// GET /api/files/:id - file status snapshot
pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FileRecord>> {
    let record = state
        .store()
        .get_file(id)?
        .ok_or_else(|| Error::FileNotFound(id.to_string()))?;
    Ok(Json(record))
}

/// Query parameters for process requests
#[derive(Debug, Deserialize)]
pub struct ProcessQuery {
    /// Priority lane: critical, default, or low
    #[serde(default)]
    pub lane: Option<String>,
}

/// Response for an accepted process request
#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub file_id: Uuid,
    pub task_id: Uuid,
}

/// POST /api/files/:id/process - submit a file for processing
pub async fn process_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<ProcessQuery>,
) -> Result<Json<ProcessResponse>> {
    let lane = params
        .lane
        .as_deref()
        .map(QueueLane::from_str)
        .unwrap_or_default();

    let task = state.queue().enqueue(id, lane)?;
    Ok(Json(ProcessResponse {
        file_id: id,
        task_id: task.id,
    }))
}

/// Response for a bulk process request
#[derive(Debug, Serialize)]
pub struct ProcessAllResponse {
    pub task_ids: Vec<Uuid>,
}

/// POST /api/files/process-all - enqueue every pending file
pub async fn process_all_files(
    State(state): State<AppState>,
) -> Result<Json<ProcessAllResponse>> {
    let task_ids = state.queue().enqueue_all_pending(QueueLane::Default)?;
    Ok(Json(ProcessAllResponse { task_ids }))
}

/// Response for a delete request
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

/// DELETE /api/files/:id - delete a file, cascading logs and tasks
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>> {
    if !state.runner().delete_file(id).await? {
        return Err(Error::FileNotFound(id.to_string()));
    }
    Ok(Json(DeleteResponse { deleted: true }))
}

/// GET /api/files/:id/logs - stage audit trail, oldest first
pub async fn get_file_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ProcessingLog>>> {
    if state.store().get_file(id)?.is_none() {
        return Err(Error::FileNotFound(id.to_string()));
    }
    Ok(Json(state.store().get_logs(id)?))
}

/// GET /api/files/:id/tasks - task attempt history, newest first
pub async fn get_file_tasks(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TaskRecord>>> {
    if state.store().get_file(id)?.is_none() {
        return Err(Error::FileNotFound(id.to_string()));
    }
    Ok(Json(state.store().tasks_for_file(id)?))
}
