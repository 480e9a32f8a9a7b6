use crate::state::AppState;
use axum::{extract::State, Json};
use bucketpipe_core::StorageBackend;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend: StorageBackend,
    pub bucket: String,
}

/// Liveness probe. Reports the configured bucket without calling it.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        backend: state.bucket.backend_type(),
        bucket: state.bucket.name().to_string(),
    })
}
