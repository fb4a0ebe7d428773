//! Similarity search endpoint

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::providers::QueryMatch;
use crate::server::state::AppState;

/// Search request
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    /// Query text
    pub query: String,
    /// Number of results (defaults from config)
    pub top_k: Option<usize>,
    /// Restrict results to one file
    pub file_id: Option<Uuid>,
}

/// Search response
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<QueryMatch>,
}

/// POST /api/search - similarity search over stored chunks
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    if request.query.trim().is_empty() {
        return Err(Error::Validation("query must not be empty".to_string()));
    }

    let top_k = request
        .top_k
        .unwrap_or(state.config().vector_store.default_top_k)
        .max(1);

    let filter = request.file_id.map(|id| {
        let mut map = Map::new();
        map.insert("file_id".to_string(), Value::String(id.to_string()));
        map
    });

    let mut per_query = state
        .vector_store()
        .query(
            &state.config().vector_store.collection,
            std::slice::from_ref(&request.query),
            top_k,
            filter.as_ref(),
        )
        .await?;

    Ok(Json(SearchResponse {
        results: per_query.pop().unwrap_or_default(),
    }))
}
