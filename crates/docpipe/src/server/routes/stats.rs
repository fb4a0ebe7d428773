//! Aggregate statistics endpoint

use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::Result;
use crate::server::state::AppState;
use crate::storage::{PipelineStats, QueueStats};

/// Combined reporting payload
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub files: PipelineStats,
    pub queue: QueueStats,
}

/// GET /api/stats - counts by status bucket, chunk totals, success rate
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    Ok(Json(StatsResponse {
        files: state.store().stats()?,
        queue: state.queue().stats()?,
    }))
}
