//! Health endpoint
//!
//! - GET /api/v1/health - Database reachability and stored session count

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub study_sessions: i64,
    pub timestamp: DateTime<Utc>,
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    state
        .pool
        .ping()
        .await
        .map_err(|e| ApiError::internal_error("Database ping failed", format!("{:#}", e)))?;

    let study_sessions = state
        .study_sessions
        .count()
        .await
        .map_err(|e| ApiError::internal_error("Failed to count sessions", e))?;

    Ok(Json(HealthResponse {
        status: "ok",
        database: state.pool.driver().as_str(),
        study_sessions,
        timestamp: Utc::now(),
    }))
}
