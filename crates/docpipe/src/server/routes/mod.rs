//! API routes for the ingestion server

pub mod files;
pub mod search;
pub mod stats;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // File lifecycle
        .route(
            "/files",
            post(files::upload_files).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route("/files", get(files::list_files))
        .route("/files/process-all", post(files::process_all_files))
        .route("/files/:id", get(files::get_file))
        .route("/files/:id", delete(files::delete_file))
        .route("/files/:id/process", post(files::process_file))
        .route("/files/:id/logs", get(files::get_file_logs))
        .route("/files/:id/tasks", get(files::get_file_tasks))
        // Reporting
        .route("/stats", get(stats::get_stats))
        // Search
        .route("/search", post(search::search))
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "docpipe",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "PDF ingestion pipeline with durable task queue and vector storage",
        "endpoints": {
            "POST /api/files": "Upload PDF documents",
            "GET /api/files": "List file status records",
            "GET /api/files/:id": "Get one file's status",
            "POST /api/files/:id/process": "Submit a file for processing",
            "POST /api/files/process-all": "Enqueue every pending file",
            "DELETE /api/files/:id": "Delete a file and its history",
            "GET /api/files/:id/logs": "Stage audit trail",
            "GET /api/files/:id/tasks": "Task attempt history",
            "GET /api/stats": "Aggregate statistics",
            "POST /api/search": "Similarity search over chunks"
        }
    }))
}
